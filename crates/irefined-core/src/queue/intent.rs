//! Queued registration intents.
//!
//! ## State Transitions
//!
//! ```text
//! Queued --match(event)--> Found --activate(clock)--> Registering --dispatch--> (removed)
//! Queued/Found --user remove--> (removed)
//! ```
//!
//! The session id lives inside the status, so an intent cannot hold one while
//! queued or lose it once found.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, ValidationError};
use crate::feed::format_season_name;
use crate::time::{canonical_start_time, format_countdown, parse_start_time};

/// Store identity: season plus canonical start time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentKey {
    pub season_id: i64,
    /// Canonical form, see [`crate::time::canonical_start_time`].
    pub start_time: String,
}

impl IntentKey {
    pub fn new(season_id: i64, start_time: &DateTime<Utc>) -> Self {
        Self {
            season_id,
            start_time: canonical_start_time(start_time),
        }
    }
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.season_id, self.start_time)
    }
}

impl FromStr for IntentKey {
    type Err = QueueError;

    /// Parses `"{season_id}-{start_time}"`; the start time is re-normalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || QueueError::MalformedKey(s.to_string());
        let (season, time) = s.split_once('-').ok_or_else(malformed)?;
        let season_id = season.parse::<i64>().map_err(|_| malformed())?;
        let at = parse_start_time(time).map_err(|_| malformed())?;
        Ok(Self::new(season_id, &at))
    }
}

/// Lifecycle status of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IntentStatus {
    Queued,
    Found { session_id: i64 },
    Registering { session_id: i64 },
}

/// Status without payload, for errors and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Queued,
    Found,
    Registering,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusKind::Queued => "queued",
            StatusKind::Found => "found",
            StatusKind::Registering => "registering",
        };
        f.write_str(s)
    }
}

impl IntentStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            IntentStatus::Queued => StatusKind::Queued,
            IntentStatus::Found { .. } => StatusKind::Found,
            IntentStatus::Registering { .. } => StatusKind::Registering,
        }
    }

    pub fn session_id(&self) -> Option<i64> {
        match self {
            IntentStatus::Queued => None,
            IntentStatus::Found { session_id } | IntentStatus::Registering { session_id } => {
                Some(*session_id)
            }
        }
    }

    /// Forward-only: queued -> found -> registering, keeping the session id.
    pub fn can_advance_to(&self, next: &IntentStatus) -> bool {
        match (self, next) {
            (IntentStatus::Queued, IntentStatus::Found { .. }) => true,
            (IntentStatus::Found { session_id: a }, IntentStatus::Registering { session_id: b }) => {
                a == b
            }
            _ => false,
        }
    }
}

/// The user's queue action, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRequest {
    pub season_id: i64,
    #[serde(default)]
    pub season_name: Option<String>,
    pub start_time: String,
    pub car_id: i64,
    pub car_class_id: i64,
}

/// A user's queued request to register for a future race session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedIntent {
    pub season_id: i64,
    pub season_name: String,
    pub car_id: i64,
    pub car_class_id: i64,
    pub requested_start_time: DateTime<Utc>,
    #[serde(flatten)]
    pub status: IntentStatus,
    pub queued_at: DateTime<Utc>,
}

impl QueuedIntent {
    /// Validate a request into a fresh `Queued` intent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidStartTime`] when the start time does
    /// not parse.
    pub fn from_request(request: QueueRequest, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let requested_start_time = parse_start_time(&request.start_time)?;
        let season_name = request
            .season_name
            .as_deref()
            .map(format_season_name)
            .unwrap_or_else(|| format!("Season {}", request.season_id));
        Ok(Self {
            season_id: request.season_id,
            season_name,
            car_id: request.car_id,
            car_class_id: request.car_class_id,
            requested_start_time,
            status: IntentStatus::Queued,
            queued_at: now,
        })
    }

    pub fn key(&self) -> IntentKey {
        IntentKey::new(self.season_id, &self.requested_start_time)
    }

    pub fn session_id(&self) -> Option<i64> {
        self.status.session_id()
    }

    /// `requested_start_time - now`, negative once the start has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.requested_start_time - now
    }

    pub fn view(&self, now: DateTime<Utc>, window: Duration) -> IntentView {
        IntentView {
            key: self.key(),
            status: self.status.kind(),
            session_id: self.session_id(),
            season_name: self.season_name.clone(),
            requested_start_time: self.requested_start_time,
            countdown: format_countdown(self.requested_start_time, now, window),
        }
    }
}

/// The `updateFields` partial. Identity and car selection are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPatch {
    #[serde(default)]
    pub season_name: Option<String>,
}

/// Read-only projection rendered by the status bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentView {
    pub key: IntentKey,
    pub status: StatusKind,
    pub session_id: Option<i64>,
    pub season_name: String,
    pub requested_start_time: DateTime<Utc>,
    pub countdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QueueRequest {
        QueueRequest {
            season_id: 42,
            season_name: Some("SeasonX - 2024 Season 2".to_string()),
            start_time: "2024-05-01T18:00:00.000Z".to_string(),
            car_id: 1,
            car_class_id: 11,
        }
    }

    #[test]
    fn from_request_normalizes_and_formats() {
        let intent = QueuedIntent::from_request(request(), Utc::now()).unwrap();
        assert_eq!(intent.season_name, "SeasonX");
        assert_eq!(intent.status, IntentStatus::Queued);
        assert_eq!(intent.key().start_time, "2024-05-01T18:00:00Z");
        assert_eq!(intent.session_id(), None);
    }

    #[test]
    fn from_request_rejects_bad_time() {
        let mut req = request();
        req.start_time = "soon".to_string();
        assert!(QueuedIntent::from_request(req, Utc::now()).is_err());
    }

    #[test]
    fn key_roundtrips_through_display() {
        let intent = QueuedIntent::from_request(request(), Utc::now()).unwrap();
        let key = intent.key();
        assert_eq!(key.to_string(), "42-2024-05-01T18:00:00Z");
        assert_eq!(key.to_string().parse::<IntentKey>().unwrap(), key);
    }

    #[test]
    fn key_parse_rejects_garbage() {
        assert!("abc".parse::<IntentKey>().is_err());
        assert!("x-2024-05-01T18:00:00Z".parse::<IntentKey>().is_err());
        assert!("42-tomorrow".parse::<IntentKey>().is_err());
    }

    #[test]
    fn status_only_moves_forward() {
        let queued = IntentStatus::Queued;
        let found = IntentStatus::Found { session_id: 9001 };
        let registering = IntentStatus::Registering { session_id: 9001 };

        assert!(queued.can_advance_to(&found));
        assert!(found.can_advance_to(&registering));
        assert!(!queued.can_advance_to(&registering));
        assert!(!found.can_advance_to(&queued));
        assert!(!registering.can_advance_to(&found));
        assert!(!found.can_advance_to(&IntentStatus::Registering { session_id: 1 }));
    }

    #[test]
    fn status_serializes_flat() {
        let mut intent = QueuedIntent::from_request(request(), Utc::now()).unwrap();
        intent.status = IntentStatus::Found { session_id: 9001 };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["status"], "found");
        assert_eq!(json["session_id"], 9001);

        let back: QueuedIntent = serde_json::from_value(json).unwrap();
        assert_eq!(back, intent);
    }
}
