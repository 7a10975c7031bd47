//! Logging configuration using tracing.

use crate::utils::{Result, SnapsyncError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` when set, `level` otherwise
pub fn filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| SnapsyncError::Config(format!("invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber.
///
/// Output goes to stderr so that `list` output on stdout stays
/// machine-readable.
pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(level)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| SnapsyncError::Config(format!("can't install logger: {}", e)))
}
