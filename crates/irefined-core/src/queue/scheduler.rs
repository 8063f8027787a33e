//! Deadline scheduler.
//!
//! Wall-clock driven and thread-free, like a timer engine: the caller invokes
//! [`DeadlineScheduler::tick`] on a fixed cadence and dispatches whatever
//! activations it returns.
//!
//! A `Found` intent activates at the first tick where
//! `requested_start_time - now <= activation_window`. The `Found -> Registering`
//! transition happens inside the tick, so a later tick cannot activate the
//! same intent twice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::intent::{IntentKey, IntentStatus, QueuedIntent};
use super::store::QueueStore;

/// Default lead time before the start at which registration begins.
pub const DEFAULT_ACTIVATION_WINDOW_SECS: i64 = 5 * 60;

/// Everything the dispatcher needs, captured at activation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub key: IntentKey,
    pub season_name: String,
    pub car_id: i64,
    pub car_class_id: i64,
    pub session_id: i64,
}

impl Activation {
    fn capture(intent: &QueuedIntent, session_id: i64) -> Self {
        Self {
            key: intent.key(),
            season_name: intent.season_name.clone(),
            car_id: intent.car_id,
            car_class_id: intent.car_class_id,
            session_id,
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Intents moved to `Registering` this tick.
    pub activations: Vec<Activation>,
    /// `Queued` intents dropped because their start passed unmatched.
    pub expired: Vec<IntentKey>,
}

#[derive(Debug, Clone)]
pub struct DeadlineScheduler {
    activation_window: Duration,
    /// `None` keeps unmatched intents forever.
    expire_unmatched_after: Option<Duration>,
}

impl Default for DeadlineScheduler {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_ACTIVATION_WINDOW_SECS), Some(Duration::minutes(10)))
    }
}

impl DeadlineScheduler {
    pub fn new(activation_window: Duration, expire_unmatched_after: Option<Duration>) -> Self {
        Self {
            activation_window,
            expire_unmatched_after,
        }
    }

    pub fn activation_window(&self) -> Duration {
        self.activation_window
    }

    /// Whether a `Found` intent is due at `now`.
    pub fn is_due(&self, intent: &QueuedIntent, now: DateTime<Utc>) -> bool {
        intent.remaining(now) <= self.activation_window
    }

    /// Transition one `Found` intent to `Registering` and capture it.
    ///
    /// Returns `None` for any other status, which makes manual activation and
    /// the clock rule share a single de-duplication point.
    pub fn activate(&self, store: &mut QueueStore, key: &IntentKey) -> Option<Activation> {
        let intent = store.get(key)?;
        let IntentStatus::Found { session_id } = intent.status else {
            return None;
        };
        let activation = Activation::capture(intent, session_id);
        store
            .update_status(key, IntentStatus::Registering { session_id })
            .ok()?;
        info!(
            session_id,
            "registering for series {}",
            activation.season_name
        );
        Some(activation)
    }

    /// Evaluate every intent against `now`.
    pub fn tick(&self, store: &mut QueueStore, now: DateTime<Utc>) -> TickOutcome {
        let mut due = Vec::new();
        let mut expired = Vec::new();

        for intent in store.iter() {
            match intent.status {
                IntentStatus::Found { .. } if self.is_due(intent, now) => due.push(intent.key()),
                IntentStatus::Queued => {
                    if let Some(grace) = self.expire_unmatched_after {
                        if now - intent.requested_start_time >= grace {
                            expired.push(intent.key());
                        }
                    }
                }
                _ => {}
            }
        }

        for key in &expired {
            if let Some(intent) = store.remove(key) {
                info!(
                    start_time = %key.start_time,
                    "no race session found for series {}, dropping from queue",
                    intent.season_name
                );
            }
        }

        let activations = due
            .iter()
            .filter_map(|key| self.activate(store, key))
            .collect();

        TickOutcome { activations, expired }
    }
}
