/*!
 * The device message protocol.
 *
 * [`DeviceMessage`] is the closed set of protocol exchanges: property
 * queries and mutations, action execution, description requests,
 * notifications, errors, logs, lifecycle changes and heartbeats. Every
 * variant carries an optional comment and a timestamp; the serde tag
 * (`"type"`) plus the per-variant fields round-trip losslessly as JSON.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use devlink_core::name::Name;
use devlink_core::value::Value;

use crate::descriptors::{ActionDescriptor, PropertyDescriptor};
use crate::device::{DeviceError, LifecycleState};

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// One unit of the device wire protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceMessage {
    /// Request the value of a property. `target_device` is mandatory.
    #[serde(rename = "property.get", rename_all = "camelCase")]
    PropertyGet {
        /// Property name
        property: String,
        /// Requesting device or controller
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_device: Option<Name>,
        /// Addressed device
        target_device: Name,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Set a property value. `target_device` is mandatory.
    #[serde(rename = "property.set", rename_all = "camelCase")]
    PropertySet {
        /// Property name
        property: String,
        /// New value
        value: Value,
        /// Requesting device or controller
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_device: Option<Name>,
        /// Addressed device
        target_device: Name,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Notify that a property value changed. `source_device` is mandatory.
    #[serde(rename = "property.changed", rename_all = "camelCase")]
    PropertyChanged {
        /// Property name
        property: String,
        /// Current value
        value: Value,
        /// Originating device
        #[serde(default)]
        source_device: Name,
        /// Addressee, when replying to a request
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Request execution of an action. `target_device` is mandatory.
    #[serde(rename = "action.execute", rename_all = "camelCase")]
    ActionExecute {
        /// Action name
        action: String,
        /// Action argument
        #[serde(default, skip_serializing_if = "Option::is_none")]
        argument: Option<Value>,
        /// Correlation id echoed back in the result
        request_id: String,
        /// Requesting device or controller
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_device: Option<Name>,
        /// Addressed device
        target_device: Name,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Result of an action execution. `source_device` is mandatory.
    #[serde(rename = "action.result", rename_all = "camelCase")]
    ActionResult {
        /// Action name
        action: String,
        /// Action result, when the action produced one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Correlation id from the request
        request_id: String,
        /// Originating device
        #[serde(default)]
        source_device: Name,
        /// Addressee, when replying to a request
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Request a device description
    #[serde(rename = "description.get", rename_all = "camelCase")]
    GetDescription {
        /// Requesting device or controller
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_device: Option<Name>,
        /// Addressed device
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// The full device description. `source_device` is mandatory.
    #[serde(rename = "description", rename_all = "camelCase")]
    Description {
        /// Device metadata
        description: Value,
        /// Descriptors of all properties
        properties: Vec<PropertyDescriptor>,
        /// Descriptors of all actions
        actions: Vec<ActionDescriptor>,
        /// Originating device
        #[serde(default)]
        source_device: Name,
        /// Addressee, when replying to a request
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Notify that a new binary payload is available out of band.
    /// `source_device` is mandatory.
    #[serde(rename = "binary.notification", rename_all = "camelCase")]
    BinaryNotification {
        /// Identifier the binary can be fetched under
        #[serde(rename = "binaryID")]
        binary_id: String,
        /// Originating device
        #[serde(default)]
        source_device: Name,
        /// Addressee
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// The evaluation of a message produced a service error
    #[serde(rename = "error", rename_all = "camelCase")]
    Error {
        /// Human-readable error message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        /// Error class, e.g. `PropertyNotFound`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_type: Option<String>,
        /// Debug rendering of the error chain
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_stack_trace: Option<String>,
        /// Device the error originated from; empty when unresolvable
        #[serde(default)]
        source_device: Name,
        /// Addressee, usually the original sender
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// Informational log record
    #[serde(rename = "log", rename_all = "camelCase")]
    Log {
        /// Log text
        message: String,
        /// Structured payload attached to the record
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Originating device
        #[serde(default)]
        source_device: Name,
        /// Addressee
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// The message was received but produced no meaningful response.
    /// Doubles as a heartbeat.
    #[serde(rename = "empty", rename_all = "camelCase")]
    Empty {
        /// Originating device
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_device: Option<Name>,
        /// Addressee
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },

    /// A device lifecycle transition
    #[serde(rename = "lifecycle", rename_all = "camelCase")]
    LifeCycle {
        /// The state the device entered
        state: LifecycleState,
        /// Originating device
        #[serde(default)]
        source_device: Name,
        /// Addressee
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_device: Option<Name>,
        /// Free-text comment
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        /// Message creation time
        #[serde(default = "now")]
        time: DateTime<Utc>,
    },
}

impl DeviceMessage {
    /// A `property.changed` notification from `source`
    pub fn property_changed(property: impl Into<String>, value: Value, source: Name) -> Self {
        DeviceMessage::PropertyChanged {
            property: property.into(),
            value,
            source_device: source,
            target_device: None,
            comment: None,
            time: now(),
        }
    }

    /// A `property.get` request addressed to `target`
    pub fn property_get(property: impl Into<String>, target: Name) -> Self {
        DeviceMessage::PropertyGet {
            property: property.into(),
            source_device: None,
            target_device: target,
            comment: None,
            time: now(),
        }
    }

    /// A `property.set` request addressed to `target`
    pub fn property_set(property: impl Into<String>, value: Value, target: Name) -> Self {
        DeviceMessage::PropertySet {
            property: property.into(),
            value,
            source_device: None,
            target_device: target,
            comment: None,
            time: now(),
        }
    }

    /// An `action.execute` request with a fresh correlation id
    pub fn action_execute(action: impl Into<String>, argument: Option<Value>, target: Name) -> Self {
        DeviceMessage::ActionExecute {
            action: action.into(),
            argument,
            request_id: uuid::Uuid::new_v4().to_string(),
            source_device: None,
            target_device: target,
            comment: None,
            time: now(),
        }
    }

    /// An `action.result` reply from `source`
    pub fn action_result(
        action: impl Into<String>,
        result: Option<Value>,
        request_id: impl Into<String>,
        source: Name,
    ) -> Self {
        DeviceMessage::ActionResult {
            action: action.into(),
            result,
            request_id: request_id.into(),
            source_device: source,
            target_device: None,
            comment: None,
            time: now(),
        }
    }

    /// A `description.get` request addressed to `target`
    pub fn get_description(target: Option<Name>) -> Self {
        DeviceMessage::GetDescription {
            source_device: None,
            target_device: target,
            comment: None,
            time: now(),
        }
    }

    /// A `lifecycle` notification from `source`
    pub fn lifecycle(state: LifecycleState, source: Name) -> Self {
        DeviceMessage::LifeCycle {
            state,
            source_device: source,
            target_device: None,
            comment: None,
            time: now(),
        }
    }

    /// An `error` message describing `error`, from `source`
    pub fn error(error: &DeviceError, source: Name, target: Option<Name>) -> Self {
        DeviceMessage::Error {
            error_message: Some(error.to_string()),
            error_type: Some(error.kind().to_string()),
            error_stack_trace: Some(format!("{:?}", error)),
            source_device: source,
            target_device: target,
            comment: None,
            time: now(),
        }
    }

    /// The source device name, when the variant carries one.
    ///
    /// Variants with a mandatory source always return `Some`.
    pub fn source_device(&self) -> Option<&Name> {
        match self {
            DeviceMessage::PropertyGet { source_device, .. }
            | DeviceMessage::PropertySet { source_device, .. }
            | DeviceMessage::ActionExecute { source_device, .. }
            | DeviceMessage::GetDescription { source_device, .. }
            | DeviceMessage::Empty { source_device, .. } => source_device.as_ref(),
            DeviceMessage::PropertyChanged { source_device, .. }
            | DeviceMessage::ActionResult { source_device, .. }
            | DeviceMessage::Description { source_device, .. }
            | DeviceMessage::BinaryNotification { source_device, .. }
            | DeviceMessage::Error { source_device, .. }
            | DeviceMessage::Log { source_device, .. }
            | DeviceMessage::LifeCycle { source_device, .. } => Some(source_device),
        }
    }

    /// The target device name, when the variant carries one
    pub fn target_device(&self) -> Option<&Name> {
        match self {
            DeviceMessage::PropertyGet { target_device, .. }
            | DeviceMessage::PropertySet { target_device, .. }
            | DeviceMessage::ActionExecute { target_device, .. } => Some(target_device),
            DeviceMessage::PropertyChanged { target_device, .. }
            | DeviceMessage::ActionResult { target_device, .. }
            | DeviceMessage::GetDescription { target_device, .. }
            | DeviceMessage::Description { target_device, .. }
            | DeviceMessage::BinaryNotification { target_device, .. }
            | DeviceMessage::Error { target_device, .. }
            | DeviceMessage::Log { target_device, .. }
            | DeviceMessage::Empty { target_device, .. }
            | DeviceMessage::LifeCycle { target_device, .. } => target_device.as_ref(),
        }
    }

    /// Message creation time
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            DeviceMessage::PropertyGet { time, .. }
            | DeviceMessage::PropertySet { time, .. }
            | DeviceMessage::PropertyChanged { time, .. }
            | DeviceMessage::ActionExecute { time, .. }
            | DeviceMessage::ActionResult { time, .. }
            | DeviceMessage::GetDescription { time, .. }
            | DeviceMessage::Description { time, .. }
            | DeviceMessage::BinaryNotification { time, .. }
            | DeviceMessage::Error { time, .. }
            | DeviceMessage::Log { time, .. }
            | DeviceMessage::Empty { time, .. }
            | DeviceMessage::LifeCycle { time, .. } => *time,
        }
    }

    /// Rewrite the source device name for hub composition.
    ///
    /// Absent optional sources stay absent; mandatory sources are always
    /// rewritten.
    pub fn change_source(mut self, rename: impl Fn(&Name) -> Name) -> Self {
        match &mut self {
            DeviceMessage::PropertyGet { source_device, .. }
            | DeviceMessage::PropertySet { source_device, .. }
            | DeviceMessage::ActionExecute { source_device, .. }
            | DeviceMessage::GetDescription { source_device, .. }
            | DeviceMessage::Empty { source_device, .. } => {
                if let Some(source) = source_device.as_ref() {
                    *source_device = Some(rename(source));
                }
            }
            DeviceMessage::PropertyChanged { source_device, .. }
            | DeviceMessage::ActionResult { source_device, .. }
            | DeviceMessage::Description { source_device, .. }
            | DeviceMessage::BinaryNotification { source_device, .. }
            | DeviceMessage::Error { source_device, .. }
            | DeviceMessage::Log { source_device, .. }
            | DeviceMessage::LifeCycle { source_device, .. } => {
                *source_device = rename(source_device);
            }
        }
        self
    }

    /// Set the target device name, e.g. to address a reply back to its
    /// requester
    pub fn with_target(mut self, target: Option<Name>) -> Self {
        match &mut self {
            DeviceMessage::PropertyGet { target_device, .. }
            | DeviceMessage::PropertySet { target_device, .. }
            | DeviceMessage::ActionExecute { target_device, .. } => {
                if let Some(target) = target {
                    *target_device = target;
                }
            }
            DeviceMessage::PropertyChanged { target_device, .. }
            | DeviceMessage::ActionResult { target_device, .. }
            | DeviceMessage::GetDescription { target_device, .. }
            | DeviceMessage::Description { target_device, .. }
            | DeviceMessage::BinaryNotification { target_device, .. }
            | DeviceMessage::Error { target_device, .. }
            | DeviceMessage::Log { target_device, .. }
            | DeviceMessage::Empty { target_device, .. }
            | DeviceMessage::LifeCycle { target_device, .. } => {
                *target_device = target;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        let cases: Vec<(DeviceMessage, &str)> = vec![
            (
                DeviceMessage::property_get("value", Name::parse("a").unwrap()),
                "property.get",
            ),
            (
                DeviceMessage::property_set("value", Value::Int(1), Name::parse("a").unwrap()),
                "property.set",
            ),
            (
                DeviceMessage::property_changed("value", Value::Int(1), Name::parse("a").unwrap()),
                "property.changed",
            ),
            (
                DeviceMessage::action_execute("reset", None, Name::parse("a").unwrap()),
                "action.execute",
            ),
            (
                DeviceMessage::action_result("reset", None, "req-1", Name::parse("a").unwrap()),
                "action.result",
            ),
            (DeviceMessage::get_description(None), "description.get"),
            (
                DeviceMessage::lifecycle(LifecycleState::Started, Name::empty()),
                "lifecycle",
            ),
        ];
        for (message, tag) in cases {
            let json: serde_json::Value =
                serde_json::from_str(&serde_json::to_string(&message).unwrap()).unwrap();
            assert_eq!(json["type"], tag);
        }
    }

    #[test]
    fn test_round_trip() {
        let messages = vec![
            DeviceMessage::property_set("target", Value::Float(2.5), Name::parse("rack.motor").unwrap()),
            DeviceMessage::property_changed("value", Value::Int(7), Name::parse("rack.motor").unwrap()),
            DeviceMessage::action_execute("home", Some(Value::Bool(true)), Name::parse("axis").unwrap()),
            DeviceMessage::Empty {
                source_device: None,
                target_device: None,
                comment: Some("heartbeat".to_string()),
                time: now(),
            },
            DeviceMessage::BinaryNotification {
                binary_id: "frame-42".to_string(),
                source_device: Name::parse("camera").unwrap(),
                target_device: None,
                comment: None,
                time: now(),
            },
        ];
        for message in messages {
            let json = serde_json::to_string(&message).unwrap();
            let back: DeviceMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, message, "round trip failed for {}", json);
        }
    }

    #[test]
    fn test_binary_id_wire_key() {
        let message = DeviceMessage::BinaryNotification {
            binary_id: "b1".to_string(),
            source_device: Name::parse("cam").unwrap(),
            target_device: None,
            comment: None,
            time: now(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&message).unwrap()).unwrap();
        assert_eq!(json["binaryID"], "b1");
        assert_eq!(json["sourceDevice"], "cam");
    }

    #[test]
    fn test_change_source_prefixes_mandatory_and_keeps_absent() {
        let token = devlink_core::name::NameToken::new("hub").unwrap();
        let changed =
            DeviceMessage::property_changed("v", Value::Int(1), Name::parse("motor").unwrap())
                .change_source(|name| &token + name);
        assert_eq!(changed.source_device().unwrap().to_string(), "hub.motor");

        let get = DeviceMessage::property_get("v", Name::parse("motor").unwrap())
            .change_source(|name| &token + name);
        assert!(get.source_device().is_none());
    }

    #[test]
    fn test_error_message_carries_kind() {
        let error = DeviceError::PropertyNotFound("speed".to_string());
        let message = DeviceMessage::error(&error, Name::parse("axis").unwrap(), None);
        match &message {
            DeviceMessage::Error {
                error_message,
                error_type,
                error_stack_trace,
                ..
            } => {
                assert_eq!(error_type.as_deref(), Some("PropertyNotFound"));
                assert!(error_message.as_deref().unwrap().contains("speed"));
                assert!(error_stack_trace.is_some());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
