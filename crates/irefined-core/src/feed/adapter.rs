//! Push-message normalization.
//!
//! A push message looks like
//!
//! ```text
//! { "data": { "delta": { "INSERT": [SessionRecord], "REGISTRATION": [SessionRecord] },
//!             "sessions": [...] } }
//! ```
//!
//! with any part possibly missing. Absence of the expected shape means "no
//! events in this message", never an error.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::event::{EventKind, SessionLifecycleEvent, SessionRecord};
use super::season::format_season_name;
use crate::error::TransportError;

/// Extract every lifecycle event from one push message.
///
/// INSERT records come first, then REGISTRATION records. A record that does
/// not deserialize is skipped on its own; the rest of the message still counts.
pub fn parse_push(message: &Value) -> Vec<SessionLifecycleEvent> {
    let Some(delta) = message.pointer("/data/delta") else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for (field, kind) in [
        ("INSERT", EventKind::Insert),
        ("REGISTRATION", EventKind::RegistrationChange),
    ] {
        let Some(records) = delta.get(field).and_then(Value::as_array) else {
            continue;
        };
        for raw in records {
            match serde_json::from_value::<SessionRecord>(raw.clone()) {
                Ok(record) => events.push(SessionLifecycleEvent::from_record(kind, record)),
                Err(e) => trace!(field, error = %e, "dropping malformed session record"),
            }
        }
    }
    events
}

/// `season_id -> display name`, built from the first push carrying a session list.
#[derive(Debug, Clone, Default)]
pub struct SeasonIndex {
    names: HashMap<i64, String>,
}

impl SeasonIndex {
    /// Build from `data.sessions[]`. Returns `None` when the message has no
    /// session list.
    pub fn from_push(message: &Value) -> Option<Self> {
        let sessions = message.pointer("/data/sessions")?.as_array()?;
        let names = sessions
            .iter()
            .filter_map(|s| {
                let id = s.get("season_id")?.as_i64()?;
                let name = s.get("season_name")?.as_str()?;
                Some((id, format_season_name(name)))
            })
            .collect();
        Some(Self { names })
    }

    pub fn get(&self, season_id: i64) -> Option<&str> {
        self.names.get(&season_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entries ordered by season id.
    pub fn entries(&self) -> Vec<(i64, &str)> {
        let mut entries: Vec<(i64, &str)> =
            self.names.iter().map(|(id, name)| (*id, name.as_str())).collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }
}

/// Publishes normalized events to the engine's lifecycle channel.
#[derive(Debug)]
pub struct FeedAdapter {
    events: mpsc::UnboundedSender<SessionLifecycleEvent>,
    index: OnceLock<SeasonIndex>,
}

impl FeedAdapter {
    pub fn new(events: mpsc::UnboundedSender<SessionLifecycleEvent>) -> Self {
        Self {
            events,
            index: OnceLock::new(),
        }
    }

    /// Normalize one push message and publish its events.
    ///
    /// Returns how many events were published.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the engine is gone.
    pub fn publish(&self, message: &Value) -> Result<usize, TransportError> {
        if self.index.get().is_none() {
            if let Some(index) = SeasonIndex::from_push(message) {
                debug!(seasons = index.len(), "season index populated");
                let _ = self.index.set(index);
            }
        }

        let events = parse_push(message);
        let count = events.len();
        for event in events {
            self.events.send(event).map_err(|_| TransportError::Closed)?;
        }
        Ok(count)
    }

    /// Display name for a season, once the index has been populated.
    pub fn season_name(&self, season_id: i64) -> Option<String> {
        self.index.get()?.get(season_id).map(str::to_string)
    }
}
