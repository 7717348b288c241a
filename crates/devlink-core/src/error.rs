/*!
 * Error types for the Devlink core crate.
 *
 * This module defines the error type shared by the core vocabulary
 * (configuration, logging, name and value handling).
 */
use thiserror::Error;

/// Error type for core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A name string could not be parsed
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A value could not be converted to the requested type
    #[error("Value conversion error: {0}")]
    ValueConversion(String),

    /// Failure while initializing or running core services
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// An operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error bubbled up from the configuration loader
    #[error("Configuration loader error: {0}")]
    ConfigLoader(#[from] config::ConfigError),

    /// Error bubbled up from JSON serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error bubbled up from TOML parsing
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    /// Create a runtime error
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Error::Runtime(message.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Error::Timeout(message.into())
    }

    /// Create a value conversion error
    pub fn value_conversion<S: Into<String>>(message: S) -> Self {
        Error::ValueConversion(message.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
