/*!
 * Simulated devices.
 *
 * An in-memory device whose "physical" state is a plain map. Used by
 * demos and tests, and as the starting point for wiring real hardware:
 * replace [`SimDriver`] with a driver that talks through a port.
 */
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use devlink_core::value::Value;

use crate::base::{DeviceBase, DeviceDriver, FnAction, MutableProperty, ReadOnlyProperty};

/// Declaration of one simulated property
#[derive(Debug, Clone)]
pub struct SimProperty {
    name: String,
    initial: Value,
    mutable: bool,
}

impl SimProperty {
    /// A read-only property with an initial reading
    pub fn read_only(name: impl Into<String>, initial: Value) -> Self {
        Self {
            name: name.into(),
            initial,
            mutable: false,
        }
    }

    /// A writable property with an initial value
    pub fn mutable(name: impl Into<String>, initial: Value) -> Self {
        Self {
            name: name.into(),
            initial,
            mutable: true,
        }
    }
}

/// Driver backing a simulated device: a map standing in for the hardware
pub struct SimDriver {
    state: RwLock<HashMap<String, Value>>,
}

impl SimDriver {
    fn new(initial: HashMap<String, Value>) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }

    /// Current "physical" value of a property
    pub async fn get(&self, property: &str) -> Option<Value> {
        self.state.read().await.get(property).cloned()
    }

    /// Set the "physical" value of a property
    pub async fn set(&self, property: &str, value: Value) {
        let _previous = self.state.write().await.insert(property.to_string(), value);
    }
}

#[async_trait]
impl DeviceDriver for SimDriver {}

/// Build a simulated device from property declarations.
///
/// Every device carries an `echo` action returning its argument, which is
/// handy for exercising the action path end to end.
pub fn sim_device(label: impl Into<String>, properties: Vec<SimProperty>) -> Arc<DeviceBase<SimDriver>> {
    let initial: HashMap<String, Value> = properties
        .iter()
        .map(|property| (property.name.clone(), property.initial.clone()))
        .collect();

    let mut builder = DeviceBase::builder(SimDriver::new(initial)).label(label);
    for property in properties {
        let name = property.name;
        if property.mutable {
            let read_name = name.clone();
            let write_name = name.clone();
            builder = builder.property(MutableProperty::new(
                name,
                move |driver: Arc<SimDriver>| {
                    let name = read_name.clone();
                    async move { Ok(driver.get(&name).await) }
                },
                move |driver: Arc<SimDriver>, value| {
                    let name = write_name.clone();
                    async move {
                        driver.set(&name, value).await;
                        Ok(())
                    }
                },
            ));
        } else {
            let read_name = name.clone();
            builder = builder.property(ReadOnlyProperty::new(name, move |driver: Arc<SimDriver>| {
                let name = read_name.clone();
                async move { Ok(driver.get(&name).await) }
            }));
        }
    }

    builder
        .action(FnAction::new("echo", |_driver, argument| async move { Ok(argument) })
            .describe("return the argument unchanged"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CachingDevice, Device};

    #[tokio::test]
    async fn test_sim_device_reads_and_writes() {
        let device = sim_device(
            "thermostat",
            vec![
                SimProperty::read_only("temperature", Value::Float(21.5)),
                SimProperty::mutable("target", Value::Float(20.0)),
            ],
        );

        assert_eq!(
            device.read_property("temperature").await.unwrap(),
            Value::Float(21.5)
        );
        device
            .write_property("target", Value::Float(22.0))
            .await
            .unwrap();
        assert_eq!(
            device.read_property("target").await.unwrap(),
            Value::Float(22.0)
        );
    }

    #[tokio::test]
    async fn test_sim_device_tracks_external_state_changes() {
        let device = sim_device(
            "meter",
            vec![SimProperty::read_only("value", Value::Int(0))],
        );

        device.read_property("value").await.unwrap();
        device.driver().set("value", Value::Int(5)).await;
        // The cache is stale until the next physical read.
        assert_eq!(device.cached("value").await, Some(Value::Int(0)));
        assert_eq!(device.read_property("value").await.unwrap(), Value::Int(5));
    }

    #[tokio::test]
    async fn test_echo_action() {
        let device = sim_device("probe", Vec::new());
        let result = device
            .execute("echo", Some(Value::from("hi")))
            .await
            .unwrap();
        assert_eq!(result, Some(Value::from("hi")));
    }
}
