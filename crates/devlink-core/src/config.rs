/*!
 * Configuration loading for Devlink.
 *
 * Configuration is layered: an optional TOML file, then `DEVLINK__`
 * environment variables. Component-specific records (port transports,
 * device definitions) are carried as structured [`crate::value::Value`]
 * trees and interpreted by their consumers.
 */
use std::collections::BTreeMap;
use std::path::Path;

use config::{Config as ConfigLoader, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::value::Value;

/// Top-level configuration for a Devlink process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named port configuration records, passed to the port registry
    #[serde(default)]
    pub ports: BTreeMap<String, Value>,

    /// Named device configuration records
    #[serde(default)]
    pub devices: BTreeMap<String, Value>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "debug", "devlink_ports=trace")
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file plus `DEVLINK__` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let loader = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("DEVLINK").separator("__"))
            .build()?;
        let config: CoreConfig = loader.try_deserialize()?;
        debug!(
            "Loaded configuration with {} port(s) and {} device(s)",
            config.ports.len(),
            config.devices.len()
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string (tests and embedded defaults)
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Initialize logging according to this configuration
    pub fn init_logging(&self) -> Result<()> {
        crate::logging::init_with_filter(&self.logging.filter)
    }
}
