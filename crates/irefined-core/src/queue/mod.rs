//! Session registration queue.
//!
//! - [`QueueStore`]: owned intent collection, keyed by season and start time
//! - [`SessionMatcher`]: moves intents to `Found` from lifecycle events
//! - [`DeadlineScheduler`]: moves `Found` intents to `Registering` on the clock
//! - [`ActionDispatcher`]: withdraw, settle, register, remove

mod dispatcher;
mod intent;
mod matcher;
mod scheduler;
mod store;

pub use dispatcher::{ActionDispatcher, PendingRegistration, SETTLE_DELAY};
pub use intent::{
    IntentKey, IntentPatch, IntentStatus, IntentView, QueueRequest, QueuedIntent, StatusKind,
};
pub use matcher::SessionMatcher;
pub use scheduler::{Activation, DeadlineScheduler, TickOutcome, DEFAULT_ACTIVATION_WINDOW_SECS};
pub use store::QueueStore;

#[cfg(test)]
pub(crate) use dispatcher::testing;
