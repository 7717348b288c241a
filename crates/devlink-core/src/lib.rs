/*!
 * Devlink Core
 *
 * Shared vocabulary for the Devlink device-control runtime: structured
 * values, hierarchical names, errors, logging and configuration.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod name;
pub mod prelude;
pub mod value;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use bytes;
    pub use chrono;
    pub use futures;
    pub use serde;
    pub use tokio;
    pub use tracing;
}

/// Devlink core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization: logging with the default filter
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("Devlink Core {} initialized", VERSION);
    Ok(())
}
