mod config;
pub mod database;

pub use config::{AutoForfeitConfig, AutoJoinConfig, Config, FeaturesConfig, JoinType, QueueConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::DatabaseError;

/// Returns `~/.config/irefined[-dev]/` based on IREFINED_ENV.
///
/// Set IREFINED_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, DatabaseError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("IREFINED_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("irefined-dev")
    } else {
        base_dir.join("irefined")
    };

    std::fs::create_dir_all(&dir).map_err(|e| DatabaseError::DataDir(e.to_string()))?;
    Ok(dir)
}
