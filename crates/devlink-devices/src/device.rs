/*!
 * Device trait and core device abstractions.
 *
 * A [`Device`] is the unit of controllable state: a named set of
 * properties and actions exposed through one uniform asynchronous
 * interface, plus a broadcast stream of [`DeviceMessage`] notifications.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devlink_core::value::Value;
use devlink_ports::PortError;

use crate::descriptors::{ActionDescriptor, PropertyDescriptor};
use crate::hub::DeviceHub;
use crate::message::DeviceMessage;

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The property is not registered on the device
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// The property has no write path
    #[error("Property is not writable: {0}")]
    PropertyNotWritable(String),

    /// The physical read produced no value
    #[error("Failed to read property: {0}")]
    PropertyReadFailed(String),

    /// The action is not registered on the device
    #[error("Action not found: {0}")]
    ActionNotFound(String),

    /// No device answers to the given name
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A dotted name descended into a device that is not a hub
    #[error("Device is not a hub: {0}")]
    NotAHub(String),

    /// The device is in the wrong lifecycle state for the operation
    #[error("Invalid device state: {0}")]
    InvalidState(String),

    /// The device name is already taken in the hub
    #[error("Device name already registered: {0}")]
    DuplicateName(String),

    /// Failure inside the device's own read/write/action logic
    #[error("Driver error: {0}")]
    Driver(String),

    /// Error from the port layer
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] devlink_core::error::Error),
}

impl DeviceError {
    /// Short error class name, carried by `error` messages
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceError::PropertyNotFound(_) => "PropertyNotFound",
            DeviceError::PropertyNotWritable(_) => "PropertyNotWritable",
            DeviceError::PropertyReadFailed(_) => "PropertyReadFailed",
            DeviceError::ActionNotFound(_) => "ActionNotFound",
            DeviceError::DeviceNotFound(_) => "DeviceNotFound",
            DeviceError::NotAHub(_) => "NotAHub",
            DeviceError::InvalidState(_) => "InvalidState",
            DeviceError::DuplicateName(_) => "DuplicateName",
            DeviceError::Driver(_) => "Driver",
            DeviceError::Port(_) => "Port",
            DeviceError::Core(_) => "Core",
        }
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// The lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// The device is initializing
    Starting,
    /// The device is initialized and running
    Started,
    /// The device is closed
    Stopped,
    /// The device encountered an irrecoverable error
    Error,
}

/// The uniform asynchronous device interface.
///
/// Reads always touch the physical device; implementations that cache
/// logical state additionally implement [`CachingDevice`].
#[async_trait]
pub trait Device: Send + Sync + Debug {
    /// Static device metadata
    fn describe(&self) -> Value {
        Value::Null
    }

    /// Descriptors of all supported properties
    fn property_descriptors(&self) -> Vec<PropertyDescriptor>;

    /// Descriptors of all supported actions
    fn action_descriptors(&self) -> Vec<ActionDescriptor>;

    /// Read the physical state of a property, updating any logical cache
    /// and pushing a change notification if the value moved.
    async fn read_property(&self, property: &str) -> Result<Value>;

    /// Write a property value. Suspends for the duration of the physical
    /// write.
    async fn write_property(&self, property: &str, value: Value) -> Result<()>;

    /// The current value without forcing a physical read when a valid
    /// cached value exists. The default has no cache and always reads.
    async fn get_or_read_property(&self, property: &str) -> Result<Value> {
        self.read_property(property).await
    }

    /// Execute an action, returning its result if it produces one
    async fn execute(&self, action: &str, argument: Option<Value>) -> Result<Option<Value>>;

    /// A multi-subscriber stream of this device's notifications
    fn messages(&self) -> BoxStream<'static, DeviceMessage>;

    /// Initialize the device; suspends until initialization finishes.
    /// Does nothing if the device is already started.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Close the device, cancelling all work it owns. Idempotent; does not
    /// wait for the shutdown to complete.
    fn stop(&self);

    /// The current lifecycle state
    fn lifecycle_state(&self) -> LifecycleState;

    /// Downcast hook for devices that contain other devices
    fn as_hub(&self) -> Option<&dyn DeviceHub> {
        None
    }
}

/// A device that keeps a logical (cached, possibly stale) view of its
/// properties next to the physical state.
#[async_trait]
pub trait CachingDevice: Device {
    /// The cached value, or `None` when the entry is invalid and must be
    /// re-read
    async fn cached(&self, property: &str) -> Option<Value>;

    /// Drop the cached entry without emitting a notification
    async fn invalidate(&self, property: &str);
}
