//! Session matcher.
//!
//! Reconciles one lifecycle event against every `Queued` intent. A match
//! requires the same season, a race event, the feed start time equal to the
//! intent's canonical start time, and a scheduled (positive) session id.

use tracing::{info, trace};

use super::intent::{IntentKey, IntentStatus, QueuedIntent};
use super::store::QueueStore;
use crate::feed::SessionLifecycleEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionMatcher;

impl SessionMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Session id the event would assign to `intent`, if it matches.
    pub fn session_for(&self, intent: &QueuedIntent, event: &SessionLifecycleEvent) -> Option<i64> {
        if intent.status != IntentStatus::Queued {
            return None;
        }
        if event.season_id != Some(intent.season_id) || !event.is_race() {
            return None;
        }
        let key = intent.key();
        if event.start_time_utc.as_deref() != Some(key.start_time.as_str()) {
            return None;
        }
        event.scheduled_session_id()
    }

    /// Apply one event to the store, moving matched intents to `Found`.
    ///
    /// Returns the keys that changed. Re-delivery after a match changes
    /// nothing because the intent is no longer queued.
    pub fn apply(&self, store: &mut QueueStore, event: &SessionLifecycleEvent) -> Vec<IntentKey> {
        let matches: Vec<(IntentKey, i64, String)> = store
            .iter()
            .filter_map(|intent| {
                self.session_for(intent, event)
                    .map(|session_id| (intent.key(), session_id, intent.season_name.clone()))
            })
            .collect();

        if matches.is_empty() {
            trace!(kind = ?event.kind, season_id = ?event.season_id, "event matched no queued intent");
        }

        let mut changed = Vec::with_capacity(matches.len());
        for (key, session_id, season_name) in matches {
            if store
                .update_status(&key, IntentStatus::Found { session_id })
                .is_ok()
            {
                info!(
                    session_id,
                    "race session for series {season_name}, start time {} found",
                    key.start_time
                );
                changed.push(key);
            }
        }
        changed
    }
}
