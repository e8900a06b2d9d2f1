//! services/client/src/telemetry.rs
//!
//! Tracing initialization for hosts embedding the client.
//!
//! RUST_LOG directives win over the level passed in, so detailed filters
//! like "info,java_tutor_client=debug" keep working.

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}
