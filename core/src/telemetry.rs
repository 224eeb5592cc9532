// Logging setup
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::{Result, TagumError};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used (for example
/// `"info,realtime=debug"`). Fails if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| TagumError::Config(format!("Failed to install tracing subscriber: {e}")))?;

    info!(target: "telemetry", "Tracing initialized");
    Ok(())
}
