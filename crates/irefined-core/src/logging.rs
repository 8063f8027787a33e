//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor a flag says otherwise.
pub const DEFAULT_LEVEL: &str = "info";

/// Install a compact stderr subscriber. `RUST_LOG` wins over `level`.
///
/// Only the first call in a process has any effect.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
