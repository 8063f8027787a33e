//! Core error types for irefined-core.
//!
//! Malformed feed messages and stale guard preconditions have no variants
//! here: the feed adapter drops bad input and the guards report decisions.

use std::path::PathBuf;
use thiserror::Error;

use crate::queue::{IntentKey, StatusKind};

/// Core error type for irefined-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Queue store errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Outbound transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Queue store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// An intent with the same season and start time is already queued
    #[error("A session for season {} at {} is already queued", .0.season_id, .0.start_time)]
    DuplicateKey(IntentKey),

    /// No intent with this key
    #[error("No queued intent {0}")]
    NotFound(IntentKey),

    /// The requested status change would move the intent backwards or skip a step
    #[error("Intent {key} cannot move from {from} to {to}")]
    InvalidTransition {
        key: IntentKey,
        from: StatusKind,
        to: StatusKind,
    },

    /// The string form of a key could not be parsed
    #[error("Malformed intent key: {0}")]
    MalformedKey(String),

    /// Request failed validation before reaching the store
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The engine owning the store has shut down
    #[error("Queue engine is not running")]
    EngineStopped,
}

/// Outbound transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nobody is listening on the other end of the outbound channel
    #[error("Outbound channel closed")]
    Closed,
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Timestamp could not be parsed
    #[error("Invalid start time '{value}': expected an RFC 3339 timestamp")]
    InvalidStartTime { value: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
