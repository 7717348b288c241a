use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::sleep;
use tracing::info;

use devlink_core::name::{Name, NameToken};
use devlink_core::value::Value;
use devlink_devices::{
    respond_hub_message, sim::sim_device, sim::SimProperty, Device, DeviceGroup, DeviceManager,
    DeviceMessage,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    devlink_core::logging::init_with_filter("debug")?;

    // Build a small device tree: a standalone thermostat plus a rack
    // grouping two gauges.
    let manager = DeviceManager::new();
    manager.install(
        "thermostat",
        sim_device(
            "thermostat",
            vec![
                SimProperty::read_only("temperature", Value::Float(21.5)),
                SimProperty::mutable("target", Value::Float(20.0)),
            ],
        ),
    )?;

    let pressure: Arc<dyn Device> = sim_device(
        "pressure",
        vec![SimProperty::read_only("value", Value::Float(1.01))],
    );
    let flow: Arc<dyn Device> = sim_device(
        "flow",
        vec![SimProperty::read_only("value", Value::Float(0.3))],
    );
    let rack = DeviceGroup::new(
        "rack",
        BTreeMap::from([
            (NameToken::new("pressure")?, pressure),
            (NameToken::new("flow")?, flow),
        ]),
    );
    manager.install("rack", rack)?;

    // Relay hub notifications the way an external transport would.
    let mut notifications = manager.messages();
    let relay = tokio::spawn(async move {
        while let Some(message) = notifications.next().await {
            if let DeviceMessage::PropertyChanged {
                property,
                value,
                source_device,
                ..
            } = message
            {
                info!("notification: {}.{} = {}", source_device, property, value);
            }
        }
    });

    // Drive the tree through the message protocol.
    let request = DeviceMessage::property_get("value", Name::parse("rack.pressure")?);
    for reply in respond_hub_message(&manager, &request).await {
        info!("reply: {:?}", reply);
    }

    let request =
        DeviceMessage::property_set("target", Value::Float(22.5), Name::parse("thermostat")?);
    for reply in respond_hub_message(&manager, &request).await {
        info!("reply: {:?}", reply);
    }

    // An unknown target is answered with a single error message.
    let request = DeviceMessage::property_get("value", Name::parse("rack.ghost")?);
    for reply in respond_hub_message(&manager, &request).await {
        info!("reply: {:?}", reply);
    }

    sleep(Duration::from_millis(100)).await;
    manager.shutdown();
    relay.abort();
    Ok(())
}
