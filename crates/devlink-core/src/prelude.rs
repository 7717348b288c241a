/*!
 * Prelude module for Devlink Core.
 *
 * Re-exports the types that nearly every Devlink crate needs.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::name::{Name, NameToken};
pub use crate::value::Value;

// Re-export configuration types
pub use crate::config::{CoreConfig, LoggingConfig};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};
