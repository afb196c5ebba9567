//! Tracing subscriber setup for binaries and tests embedding the engine.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global fmt subscriber filtered by `filter` (or `RUST_LOG` when set).
///
/// Returns `false` if a global subscriber was already installed, which is
/// expected when several tests share a process.
pub fn init(filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
