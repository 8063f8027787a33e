//! Event Feed Adapter.
//!
//! Turns opaque `data_services_push` messages into typed session lifecycle
//! events and publishes them on a single channel. The queue engine is the one
//! subscriber.

mod adapter;
mod event;
mod season;

pub use adapter::{parse_push, FeedAdapter, SeasonIndex};
pub use event::{EventKind, SessionLifecycleEvent, SessionRecord, RACE_EVENT_TYPE};
pub use season::format_season_name;
