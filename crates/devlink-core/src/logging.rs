/*!
 * Logging bootstrap for Devlink.
 *
 * Thin wrappers over `tracing-subscriber` so every binary and test harness
 * configures logging the same way.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Initialize the logging system with the default `info` filter
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// The `RUST_LOG` environment variable takes precedence over `filter`.
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Create a span for work owned by one port
pub fn port_span(label: &str) -> tracing::Span {
    tracing::info_span!("port", label = %label)
}

/// Create a span for work owned by one device
pub fn device_span(name: &str) -> tracing::Span {
    tracing::info_span!("device", name = %name)
}
