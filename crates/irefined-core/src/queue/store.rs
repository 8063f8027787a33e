//! In-memory queue store.
//!
//! Owned by the engine and handed by reference to the matcher, scheduler and
//! dispatcher. All mutation is synchronous; the next scheduler tick sees it.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use tracing::info;

use super::intent::{IntentKey, IntentPatch, IntentStatus, IntentView, QueuedIntent};
use crate::error::QueueError;

#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    intents: IndexMap<IntentKey, QueuedIntent>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn get(&self, key: &IntentKey) -> Option<&QueuedIntent> {
        self.intents.get(key)
    }

    pub fn contains(&self, key: &IntentKey) -> bool {
        self.intents.contains_key(key)
    }

    /// Snapshot ordered by requested start time, ties in insertion order.
    pub fn list(&self) -> Vec<QueuedIntent> {
        let mut items: Vec<QueuedIntent> = self.intents.values().cloned().collect();
        items.sort_by_key(|i| i.requested_start_time);
        items
    }

    /// Status-bar projection of [`list`](Self::list).
    pub fn views(&self, now: DateTime<Utc>, window: Duration) -> Vec<IntentView> {
        self.list().iter().map(|i| i.view(now, window)).collect()
    }

    /// Iterate in insertion order. Used by the matcher and scheduler, which
    /// work by identity and do not care about display order.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedIntent> {
        self.intents.values()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert a new intent.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DuplicateKey`] when the same season and start
    /// time is already queued; the store is left unchanged.
    pub fn add(&mut self, intent: QueuedIntent) -> Result<IntentKey, QueueError> {
        let key = intent.key();
        if self.intents.contains_key(&key) {
            return Err(QueueError::DuplicateKey(key));
        }
        info!(
            season_id = intent.season_id,
            start_time = %key.start_time,
            "added session for series {} to queue",
            intent.season_name
        );
        self.intents.insert(key.clone(), intent);
        Ok(key)
    }

    /// Remove an intent. Returns it if it was present.
    pub fn remove(&mut self, key: &IntentKey) -> Option<QueuedIntent> {
        self.intents.shift_remove(key)
    }

    /// Advance an intent's status.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] for an unknown key,
    /// [`QueueError::InvalidTransition`] for anything but a single forward step.
    pub fn update_status(&mut self, key: &IntentKey, status: IntentStatus) -> Result<(), QueueError> {
        let intent = self
            .intents
            .get_mut(key)
            .ok_or_else(|| QueueError::NotFound(key.clone()))?;
        if !intent.status.can_advance_to(&status) {
            return Err(QueueError::InvalidTransition {
                key: key.clone(),
                from: intent.status.kind(),
                to: status.kind(),
            });
        }
        intent.status = status;
        Ok(())
    }

    /// Apply a partial update to the mutable display fields.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] for an unknown key.
    pub fn update_fields(&mut self, key: &IntentKey, patch: IntentPatch) -> Result<(), QueueError> {
        let intent = self
            .intents
            .get_mut(key)
            .ok_or_else(|| QueueError::NotFound(key.clone()))?;
        if let Some(name) = patch.season_name {
            intent.season_name = name;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.intents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::intent::{QueueRequest, StatusKind};
    use proptest::prelude::*;

    fn intent(season_id: i64, start_time: &str) -> QueuedIntent {
        QueuedIntent::from_request(
            QueueRequest {
                season_id,
                season_name: Some(format!("Series {season_id}")),
                start_time: start_time.to_string(),
                car_id: 1,
                car_class_id: 2,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut store = QueueStore::new();
        store.add(intent(42, "2024-05-01T18:00:00Z")).unwrap();

        let err = store.add(intent(42, "2024-05-01T18:00:00.000Z")).unwrap_err();
        assert!(matches!(err, QueueError::DuplicateKey(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn same_time_different_season_is_allowed() {
        let mut store = QueueStore::new();
        store.add(intent(42, "2024-05-01T18:00:00Z")).unwrap();
        store.add(intent(43, "2024-05-01T18:00:00Z")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn list_is_ordered_by_start_time() {
        let mut store = QueueStore::new();
        store.add(intent(1, "2024-05-01T20:00:00Z")).unwrap();
        store.add(intent(2, "2024-05-01T18:00:00Z")).unwrap();
        store.add(intent(3, "2024-05-01T19:00:00Z")).unwrap();

        let ids: Vec<i64> = store.list().iter().map(|i| i.season_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn update_status_enforces_forward_only() {
        let mut store = QueueStore::new();
        let key = store.add(intent(42, "2024-05-01T18:00:00Z")).unwrap();

        let err = store
            .update_status(&key, IntentStatus::Registering { session_id: 1 })
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: StatusKind::Queued,
                to: StatusKind::Registering,
                ..
            }
        ));

        store.update_status(&key, IntentStatus::Found { session_id: 1 }).unwrap();
        store
            .update_status(&key, IntentStatus::Registering { session_id: 1 })
            .unwrap();
        assert!(store.update_status(&key, IntentStatus::Queued).is_err());
        assert_eq!(store.get(&key).unwrap().session_id(), Some(1));
    }

    #[test]
    fn update_unknown_key_reports_not_found() {
        let mut store = QueueStore::new();
        let key = intent(1, "2024-05-01T18:00:00Z").key();
        assert!(matches!(
            store.update_status(&key, IntentStatus::Found { session_id: 5 }),
            Err(QueueError::NotFound(_))
        ));
        assert!(matches!(
            store.update_fields(&key, IntentPatch::default()),
            Err(QueueError::NotFound(_))
        ));
    }

    #[test]
    fn update_fields_changes_display_name_only() {
        let mut store = QueueStore::new();
        let key = store.add(intent(42, "2024-05-01T18:00:00Z")).unwrap();
        store
            .update_fields(
                &key,
                IntentPatch {
                    season_name: Some("Renamed".to_string()),
                },
            )
            .unwrap();
        let stored = store.get(&key).unwrap();
        assert_eq!(stored.season_name, "Renamed");
        assert_eq!(stored.car_id, 1);
    }

    #[test]
    fn remove_returns_intent() {
        let mut store = QueueStore::new();
        let key = store.add(intent(42, "2024-05-01T18:00:00Z")).unwrap();
        assert!(store.remove(&key).is_some());
        assert!(store.remove(&key).is_none());
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn store_never_holds_duplicate_keys(
            adds in proptest::collection::vec((0i64..4, 0u32..4, 0u32..1000), 0..40)
        ) {
            let mut store = QueueStore::new();
            for (season, hour, millis) in adds {
                let start = format!("2024-05-01T1{hour}:00:00.{millis:03}Z");
                let _ = store.add(intent(season, &start));
            }
            let mut keys: Vec<IntentKey> = store.iter().map(QueuedIntent::key).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);
            prop_assert!(total <= 16);
        }
    }
}
