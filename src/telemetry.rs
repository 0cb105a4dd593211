//! Logging setup for zonectl binaries.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;
use crate::error::{Result, ZoneCtlError};

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| ZoneCtlError::Internal {
            message: format!("failed to install tracing subscriber: {}", e),
        })
}
