/*!
 * Devlink Devices
 *
 * The device layer of the Devlink runtime: uniform property/action
 * devices, the message protocol, hierarchical hubs and message dispatch.
 */

#![warn(missing_docs)]

pub mod base;
pub mod descriptors;
pub mod device;
pub mod hub;
pub mod manager;
pub mod message;
pub mod respond;
pub mod sim;

// Re-export the types most consumers need
pub use base::{DeviceBase, DeviceDriver, FnAction, MutableProperty, ReadOnlyProperty};
pub use descriptors::{ActionDescriptor, PropertyDescriptor};
pub use device::{CachingDevice, Device, DeviceError, LifecycleState};
pub use hub::{device_tree, hub_message_flow, resolve, DeviceGroup, DeviceHub};
pub use manager::DeviceManager;
pub use message::DeviceMessage;
pub use respond::{respond_hub_message, respond_message};

/// Devlink devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
