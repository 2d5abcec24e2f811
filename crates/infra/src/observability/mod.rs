//! Tracing subscriber setup

use orderlink_domain::{LoggingConfig, OrderLinkError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Filter from `RUST_LOG` when set, else the configured level.
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_env("RUST_LOG").or_else(|_| {
        EnvFilter::try_new(&config.level)
            .map_err(|e| OrderLinkError::Config(format!("invalid log level {:?}: {e}", config.level)))
    })
}

/// Install the global subscriber: human-readable or JSON lines.
///
/// # Errors
/// Returns `Config` for an unparseable level and `Internal` when a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = Registry::default().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json().with_target(true).with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| OrderLinkError::Internal(format!("tracing already initialised: {e}")))
}
