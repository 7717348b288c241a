/*!
 * Message dispatch.
 *
 * The two entry points external transports call into: [`respond_message`]
 * answers a message on behalf of one device, [`respond_hub_message`]
 * routes a message through a hub by dotted name or fans it out to every
 * device. Anything that goes wrong crossing this boundary is converted
 * into an `error` message addressed back to the sender; a remote caller
 * never sees a raw fault and never goes unanswered.
 */
use chrono::Utc;

use devlink_core::name::Name;

use crate::device::{Device, Result};
use crate::hub::{device_tree, resolve, DeviceHub};
use crate::message::DeviceMessage;

/// Process a message targeted at this device, assuming its hub-qualified
/// name is `target`. Returns `None` for messages that need no reply.
pub async fn respond_message(
    device: &dyn Device,
    target: &Name,
    request: &DeviceMessage,
) -> Option<DeviceMessage> {
    match try_respond(device, target, request).await {
        Ok(reply) => reply,
        Err(error) => Some(DeviceMessage::error(
            &error,
            target.clone(),
            request.source_device().cloned(),
        )),
    }
}

async fn try_respond(
    device: &dyn Device,
    target: &Name,
    request: &DeviceMessage,
) -> Result<Option<DeviceMessage>> {
    match request {
        DeviceMessage::PropertyGet {
            property,
            source_device,
            ..
        } => {
            let value = device.get_or_read_property(property).await?;
            Ok(Some(
                DeviceMessage::property_changed(property, value, target.clone())
                    .with_target(source_device.clone()),
            ))
        }

        DeviceMessage::PropertySet {
            property,
            value,
            source_device,
            ..
        } => {
            device.write_property(property, value.clone()).await?;
            let value = device.get_or_read_property(property).await?;
            Ok(Some(
                DeviceMessage::property_changed(property, value, target.clone())
                    .with_target(source_device.clone()),
            ))
        }

        DeviceMessage::ActionExecute {
            action,
            argument,
            request_id,
            source_device,
            ..
        } => {
            let result = device.execute(action, argument.clone()).await?;
            Ok(Some(
                DeviceMessage::action_result(action, result, request_id, target.clone())
                    .with_target(source_device.clone()),
            ))
        }

        DeviceMessage::GetDescription { source_device, .. } => Ok(Some(DeviceMessage::Description {
            description: device.describe(),
            properties: device.property_descriptors(),
            actions: device.action_descriptors(),
            source_device: target.clone(),
            target_device: source_device.clone(),
            comment: None,
            time: Utc::now(),
        })),

        // Replies and notifications produce no reply of their own.
        DeviceMessage::PropertyChanged { .. }
        | DeviceMessage::ActionResult { .. }
        | DeviceMessage::Description { .. }
        | DeviceMessage::BinaryNotification { .. }
        | DeviceMessage::Error { .. }
        | DeviceMessage::Log { .. }
        | DeviceMessage::Empty { .. }
        | DeviceMessage::LifeCycle { .. } => Ok(None),
    }
}

/// Process an incoming message using hub naming to find the target.
///
/// A message without a target is delivered to every device in the
/// flattened hub and all replies are collected. A message with a target
/// goes only to that device; when the name does not resolve, the result
/// is exactly one `error` message with an empty source, addressed to the
/// stated sender.
pub async fn respond_hub_message(hub: &dyn DeviceHub, request: &DeviceMessage) -> Vec<DeviceMessage> {
    match request.target_device() {
        None => {
            let mut replies = Vec::new();
            for (name, device) in device_tree(hub) {
                if let Some(reply) = respond_message(device.as_ref(), &name, request).await {
                    replies.push(reply);
                }
            }
            replies
        }
        Some(target) => match resolve(hub, target) {
            Ok(device) => respond_message(device.as_ref(), target, request)
                .await
                .into_iter()
                .collect(),
            Err(error) => vec![DeviceMessage::error(
                &error,
                Name::empty(),
                request.source_device().cloned(),
            )],
        },
    }
}
