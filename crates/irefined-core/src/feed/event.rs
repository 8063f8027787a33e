use serde::{Deserialize, Serialize};

/// `event_type` value the platform uses for race sessions.
pub const RACE_EVENT_TYPE: i64 = 5;

/// Which delta array a record arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Insert,
    RegistrationChange,
}

/// One session entry inside a push delta, as the platform sends it.
///
/// Every field is optional; the platform populates different subsets for
/// inserts and registration changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub season_id: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub event_type: Option<i64>,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub will_be_scored: Option<bool>,
    #[serde(default)]
    pub subsession_id: Option<i64>,
}

/// A session lifecycle notification. Transient; consumed once by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLifecycleEvent {
    pub kind: EventKind,
    pub season_id: Option<i64>,
    /// Start time exactly as the feed reported it.
    pub start_time_utc: Option<String>,
    pub event_type: Option<i64>,
    pub session_id: Option<i64>,
    pub will_be_scored: Option<bool>,
    pub subsession_id: Option<i64>,
}

impl SessionLifecycleEvent {
    pub fn from_record(kind: EventKind, record: SessionRecord) -> Self {
        Self {
            kind,
            season_id: record.season_id,
            start_time_utc: record.start_time,
            event_type: record.event_type,
            session_id: record.session_id,
            will_be_scored: record.will_be_scored,
            subsession_id: record.subsession_id,
        }
    }

    pub fn is_race(&self) -> bool {
        self.event_type == Some(RACE_EVENT_TYPE)
    }

    /// A zero or missing session id marks a provisional slot, not a real
    /// scheduled instance.
    pub fn scheduled_session_id(&self) -> Option<i64> {
        self.session_id.filter(|id| *id > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_session_ids_are_not_scheduled() {
        let mut event = SessionLifecycleEvent::from_record(
            EventKind::Insert,
            SessionRecord {
                session_id: Some(0),
                ..SessionRecord::default()
            },
        );
        assert_eq!(event.scheduled_session_id(), None);

        event.session_id = Some(-4);
        assert_eq!(event.scheduled_session_id(), None);

        event.session_id = Some(9001);
        assert_eq!(event.scheduled_session_id(), Some(9001));
    }

    #[test]
    fn record_tolerates_unknown_and_missing_fields() {
        let record: SessionRecord =
            serde_json::from_str(r#"{"season_id": 42, "track": {"name": "Spa"}}"#).unwrap();
        assert_eq!(record.season_id, Some(42));
        assert!(record.start_time.is_none());
    }
}
