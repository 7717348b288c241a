/*!
 * Device hubs.
 *
 * A hub is a named collection of devices (and possibly nested hubs)
 * addressed by dotted names. Hub membership is a tree: every non-empty
 * name resolves to exactly one device or fails.
 */
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use devlink_core::name::{Name, NameToken};
use devlink_core::value::Value;

use crate::descriptors::{ActionDescriptor, PropertyDescriptor};
use crate::device::{Device, DeviceError, LifecycleState, Result};
use crate::message::DeviceMessage;

/// A container of devices keyed by a single name segment
pub trait DeviceHub: Send + Sync {
    /// The direct children of this hub
    fn devices(&self) -> BTreeMap<NameToken, Arc<dyn Device>>;

    /// The hub itself, when the hub is also a device reachable by the
    /// empty name
    fn own_device(&self) -> Option<Arc<dyn Device>> {
        None
    }

    /// The hub's own notification stream, when the hub is also a device
    fn own_messages(&self) -> Option<BoxStream<'static, DeviceMessage>> {
        None
    }
}

/// Resolve a dotted name by walking its segments through nested hubs.
///
/// The empty name resolves to the hub itself when the hub is a device.
/// Resolution fails when a segment is absent or an intermediate child is
/// not a hub.
pub fn resolve(hub: &dyn DeviceHub, name: &Name) -> Result<Arc<dyn Device>> {
    let Some(first) = name.first() else {
        return hub
            .own_device()
            .ok_or_else(|| DeviceError::DeviceNotFound(String::new()));
    };
    let device = hub
        .devices()
        .get(first)
        .cloned()
        .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))?;
    let rest = name.cut_first();
    if rest.is_empty() {
        return Ok(device);
    }
    match device.as_hub() {
        Some(child_hub) => {
            resolve(child_hub, &rest).map_err(|_| DeviceError::DeviceNotFound(name.to_string()))
        }
        None => Err(DeviceError::NotAHub(first.to_string())),
    }
}

/// All devices reachable from the hub, flattened into one dotted-name
/// space. Child hubs contribute their own aggregated content with every
/// name re-prefixed by the child's token.
pub fn device_tree(hub: &dyn DeviceHub) -> BTreeMap<Name, Arc<dyn Device>> {
    let mut tree = BTreeMap::new();
    for (token, device) in hub.devices() {
        if let Some(child_hub) = device.as_hub() {
            for (child_name, child_device) in device_tree(child_hub) {
                let _previous = tree.insert(&token + &child_name, child_device);
            }
        }
        let _previous = tree.insert(token.into_name(), device);
    }
    tree
}

/// Merge the notification streams of the hub and every descendant device
/// into one stream with fully-qualified source names.
///
/// The merged stream offers no cross-device ordering guarantee. It
/// captures the hub's membership at call time.
pub fn hub_message_flow(hub: &dyn DeviceHub) -> BoxStream<'static, DeviceMessage> {
    let mut streams: Vec<BoxStream<'static, DeviceMessage>> = Vec::new();
    if let Some(own) = hub.own_messages() {
        streams.push(own);
    }
    for (token, device) in hub.devices() {
        let inner = match device.as_hub() {
            Some(child_hub) => hub_message_flow(child_hub),
            None => device.messages(),
        };
        streams.push(
            inner
                .map(move |message| message.change_source(|source| &token + source))
                .boxed(),
        );
    }
    stream::select_all(streams).boxed()
}

/// A composite device: a fixed group of child devices that is itself a
/// device, so groups nest inside hubs and other groups.
pub struct DeviceGroup {
    label: String,
    children: BTreeMap<NameToken, Arc<dyn Device>>,
    self_ref: Weak<DeviceGroup>,
}

impl Debug for DeviceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group[{}]", self.label)
    }
}

impl DeviceGroup {
    /// Build a group from its children
    pub fn new(
        label: impl Into<String>,
        children: BTreeMap<NameToken, Arc<dyn Device>>,
    ) -> Arc<Self> {
        let label = label.into();
        Arc::new_cyclic(|self_ref| Self {
            label,
            children,
            self_ref: self_ref.clone(),
        })
    }
}

#[async_trait]
impl Device for DeviceGroup {
    fn describe(&self) -> Value {
        Value::object([("label", Value::from(self.label.clone()))])
    }

    fn property_descriptors(&self) -> Vec<PropertyDescriptor> {
        Vec::new()
    }

    fn action_descriptors(&self) -> Vec<ActionDescriptor> {
        Vec::new()
    }

    async fn read_property(&self, property: &str) -> Result<Value> {
        Err(DeviceError::PropertyNotFound(property.to_string()))
    }

    async fn write_property(&self, property: &str, _value: Value) -> Result<()> {
        Err(DeviceError::PropertyNotFound(property.to_string()))
    }

    async fn execute(&self, action: &str, _argument: Option<Value>) -> Result<Option<Value>> {
        Err(DeviceError::ActionNotFound(action.to_string()))
    }

    fn messages(&self) -> BoxStream<'static, DeviceMessage> {
        stream::empty().boxed()
    }

    async fn start(&self) -> Result<()> {
        for device in self.children.values() {
            device.start().await?;
        }
        Ok(())
    }

    fn stop(&self) {
        for device in self.children.values() {
            device.stop();
        }
    }

    fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::Started
    }

    fn as_hub(&self) -> Option<&dyn DeviceHub> {
        Some(self)
    }
}

impl DeviceHub for DeviceGroup {
    fn devices(&self) -> BTreeMap<NameToken, Arc<dyn Device>> {
        self.children.clone()
    }

    fn own_device(&self) -> Option<Arc<dyn Device>> {
        self.self_ref.upgrade().map(|group| group as Arc<dyn Device>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{sim_device, SimProperty};

    fn token(text: &str) -> NameToken {
        NameToken::new(text).unwrap()
    }

    fn leaf(value: i64) -> Arc<dyn Device> {
        sim_device(
            "leaf",
            vec![SimProperty::read_only("value", Value::Int(value))],
        )
    }

    struct MapHub {
        children: BTreeMap<NameToken, Arc<dyn Device>>,
    }

    impl DeviceHub for MapHub {
        fn devices(&self) -> BTreeMap<NameToken, Arc<dyn Device>> {
            self.children.clone()
        }
    }

    fn nested_hub() -> MapHub {
        // {a: device, b: group{c: device}}
        let group: Arc<dyn Device> = DeviceGroup::new(
            "b",
            BTreeMap::from([(token("c"), leaf(2))]),
        );
        MapHub {
            children: BTreeMap::from([(token("a"), leaf(1)), (token("b"), group)]),
        }
    }

    #[tokio::test]
    async fn test_resolve_walks_segments() {
        let hub = nested_hub();

        let a = resolve(&hub, &Name::parse("a").unwrap()).unwrap();
        assert_eq!(a.read_property("value").await.unwrap(), Value::Int(1));

        let c = resolve(&hub, &Name::parse("b.c").unwrap()).unwrap();
        assert_eq!(c.read_property("value").await.unwrap(), Value::Int(2));

        let b = resolve(&hub, &Name::parse("b").unwrap()).unwrap();
        assert!(b.as_hub().is_some());
    }

    #[test]
    fn test_resolve_failures() {
        let hub = nested_hub();
        assert!(matches!(
            resolve(&hub, &Name::parse("missing").unwrap()),
            Err(DeviceError::DeviceNotFound(_))
        ));
        assert!(matches!(
            resolve(&hub, &Name::parse("b.missing").unwrap()),
            Err(DeviceError::DeviceNotFound(_))
        ));
        // Descending through a leaf device fails.
        assert!(matches!(
            resolve(&hub, &Name::parse("a.deeper").unwrap()),
            Err(DeviceError::NotAHub(_))
        ));
        // The empty name only resolves when the hub is itself a device.
        assert!(resolve(&hub, &Name::empty()).is_err());
    }

    #[test]
    fn test_empty_name_resolves_group_itself() {
        let group = DeviceGroup::new("g", BTreeMap::from([(token("c"), leaf(2))]));
        let resolved = resolve(group.as_ref(), &Name::empty()).unwrap();
        assert!(resolved.as_hub().is_some());
    }

    #[test]
    fn test_device_tree_flattens_with_prefixes() {
        let hub = nested_hub();
        let tree = device_tree(&hub);
        let names: Vec<String> = tree.keys().map(Name::to_string).collect();
        assert_eq!(names, vec!["a", "b", "b.c"]);
    }

    #[tokio::test]
    async fn test_hub_message_flow_prefixes_sources() {
        let hub = nested_hub();
        let mut flow = hub_message_flow(&hub);

        let c = resolve(&hub, &Name::parse("b.c").unwrap()).unwrap();
        c.read_property("value").await.unwrap();

        match flow.next().await.unwrap() {
            DeviceMessage::PropertyChanged { source_device, property, .. } => {
                assert_eq!(source_device.to_string(), "b.c");
                assert_eq!(property, "value");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
