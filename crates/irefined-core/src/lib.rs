//! # iRefined Core Library
//!
//! Session registration queue engine for the iRefined racing-platform client
//! extension. A user queues a future race session; the engine waits for the
//! platform to announce it, then withdraws from whatever the user is in and
//! registers for the queued session a few minutes before it starts.
//!
//! ## Architecture
//!
//! - **Feed**: normalizes platform push messages into lifecycle events
//! - **Queue**: store, matcher, wall-clock deadline scheduler and dispatcher
//! - **Guards**: auto-join and auto-forfeit checks against the live session
//! - **Engine**: one tokio task tying it all together behind [`EngineHandle`]
//! - **Storage**: TOML configuration and a SQLite key-value store
//!
//! ## Key Components
//!
//! - [`Engine`]: owns the queue and runs the event loop
//! - [`QueueStore`]: keyed set of queued intents
//! - [`Transport`]: outbound command sink
//! - [`Config`]: application configuration management

pub mod engine;
pub mod error;
pub mod features;
pub mod feed;
pub mod guards;
pub mod logging;
pub mod queue;
pub mod storage;
pub mod time;
pub mod timers;
pub mod transport;

pub use engine::{Engine, EngineHandle};
pub use error::{ConfigError, CoreError, DatabaseError, QueueError, TransportError, ValidationError};
pub use features::{FeatureId, FeatureManager};
pub use feed::{FeedAdapter, SessionLifecycleEvent};
pub use guards::{ForfeitDecision, JoinDecision, LiveObservation, RegistrationStatus};
pub use queue::{IntentKey, IntentView, QueueRequest, QueueStore, QueuedIntent};
pub use storage::{Config, Database};
pub use transport::{ChannelJoinControl, ChannelTransport, DataServicesRequest, JoinControl, Transport};
