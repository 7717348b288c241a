/*!
 * Device manager.
 *
 * The process-wide device registry: a hub owning the top level of the
 * device tree. It is an explicit object passed by reference, registered
 * into at startup, and it owns the shutdown of every device installed
 * into it.
 */
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use futures::stream::BoxStream;
use tracing::{debug, error, info};

use devlink_core::name::NameToken;

use crate::device::{Device, DeviceError, Result};
use crate::hub::{hub_message_flow, DeviceHub};
use crate::message::DeviceMessage;

/// The root hub devices are installed into
pub struct DeviceManager {
    devices: RwLock<BTreeMap<NameToken, Arc<dyn Device>>>,
}

impl DeviceManager {
    /// An empty manager
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a device under `name` and start it in the background.
    ///
    /// Fails on malformed names and duplicates; registered names are
    /// stable for the life of the process.
    pub fn install(&self, name: &str, device: Arc<dyn Device>) -> Result<()> {
        let token = NameToken::new(name)?;
        {
            let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
            if devices.contains_key(&token) {
                return Err(DeviceError::DuplicateName(name.to_string()));
            }
            let _previous = devices.insert(token, device.clone());
        }
        debug!("Installed device '{}'", name);

        let name = name.to_string();
        let _task = tokio::spawn(async move {
            if let Err(e) = device.start().await {
                error!("Failed to start device '{}': {}", name, e);
            }
        });
        Ok(())
    }

    /// The merged notification stream of every installed device, with
    /// fully-qualified source names
    pub fn messages(&self) -> BoxStream<'static, DeviceMessage> {
        hub_message_flow(self)
    }

    /// Number of installed devices
    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no devices are installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every installed device and forget them
    pub fn shutdown(&self) {
        let devices = {
            let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *devices)
        };
        for (name, device) in devices {
            debug!("Stopping device '{}'", name);
            device.stop();
        }
        info!("Device manager shut down");
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceHub for DeviceManager {
    fn devices(&self) -> BTreeMap<NameToken, Arc<dyn Device>> {
        self.devices.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LifecycleState;
    use crate::hub::resolve;
    use crate::respond::respond_hub_message;
    use crate::sim::{sim_device, SimProperty};
    use devlink_core::name::Name;
    use devlink_core::value::Value;
    use std::time::Duration;

    #[tokio::test]
    async fn test_install_and_resolve() {
        let manager = DeviceManager::new();
        manager
            .install(
                "motor",
                sim_device("motor", vec![SimProperty::read_only("value", Value::Int(1))]),
            )
            .unwrap();

        let device = resolve(&manager, &Name::parse("motor").unwrap()).unwrap();
        assert_eq!(device.read_property("value").await.unwrap(), Value::Int(1));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let manager = DeviceManager::new();
        manager
            .install("motor", sim_device("motor", Vec::new()))
            .unwrap();
        assert!(matches!(
            manager.install("motor", sim_device("motor", Vec::new())),
            Err(DeviceError::DuplicateName(_))
        ));
        assert!(manager.install("mo.tor", sim_device("motor", Vec::new())).is_err());
    }

    #[tokio::test]
    async fn test_install_starts_devices() {
        let manager = DeviceManager::new();
        let device = sim_device("motor", Vec::new());
        manager.install("motor", device.clone()).unwrap();

        for _ in 0..50 {
            if device.lifecycle_state() == LifecycleState::Started {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("installed device did not start");
    }

    #[tokio::test]
    async fn test_shutdown_stops_devices() {
        let manager = DeviceManager::new();
        let device = sim_device("motor", Vec::new());
        manager.install("motor", device.clone()).unwrap();
        device.start().await.unwrap();

        manager.shutdown();
        assert_eq!(device.lifecycle_state(), LifecycleState::Stopped);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_manager_routes_hub_messages() {
        let manager = DeviceManager::new();
        manager
            .install(
                "gauge",
                sim_device(
                    "gauge",
                    vec![SimProperty::read_only("value", Value::Float(1.5))],
                ),
            )
            .unwrap();

        let request = DeviceMessage::property_get("value", Name::parse("gauge").unwrap());
        let replies = respond_hub_message(&manager, &request).await;
        assert_eq!(replies.len(), 1);
    }
}
