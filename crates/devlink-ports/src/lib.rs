/*!
 * Devlink Ports
 *
 * The byte-stream port layer of the Devlink device-control runtime:
 * buffered transport endpoints, phrase framing, transparent reconnection,
 * request/response serialization and a transport factory registry.
 */

#![warn(missing_docs)]

pub mod phrases;
pub mod port;
pub mod reconnect;
pub mod registry;
pub mod sync;
pub mod tcp;
pub mod udp;

#[cfg(feature = "serial")]
pub mod serial;

// Re-export the types most consumers need
pub use phrases::PhraseFramer;
pub use port::{BufferedPort, OverflowPolicy, Port, PortError, PortOptions};
pub use reconnect::{ReconnectOptions, ReconnectingPort};
pub use registry::{PortFactory, PortRegistry};
pub use sync::SynchronousPort;

/// Devlink ports crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transport types available in this build
pub fn available_transports() -> Vec<&'static str> {
    let mut transports = vec!["tcp", "udp"];

    #[cfg(feature = "serial")]
    transports.push("serial");

    transports
}
