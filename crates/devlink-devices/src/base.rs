/*!
 * Caching device base.
 *
 * [`DeviceBase`] turns a plain driver type (the physical half, typically
 * owning a port) into a full [`Device`]: it keeps the logical state cache,
 * emits change notifications, runs the lifecycle and owns the cancellation
 * scope for all background work.
 */
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use devlink_core::name::Name;
use devlink_core::value::Value;

use crate::descriptors::{ActionDescriptor, PropertyDescriptor};
use crate::device::{CachingDevice, Device, DeviceError, LifecycleState, Result};
use crate::message::DeviceMessage;

/// Default capacity of the notification broadcast channel
const DEFAULT_MESSAGE_BUFFER: usize = 1000;

/// The physical half of a device: the object that actually talks to the
/// hardware. Property and action handlers receive it by `Arc`.
#[async_trait]
pub trait DeviceDriver: Send + Sync + 'static {
    /// Hook run while the device transitions to `Started`
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Hook run when the device stops
    fn on_stop(&self) {}
}

/// One property handler: descriptor plus typed read (and optionally write)
/// accessors against the driver
#[async_trait]
pub trait DeviceProperty<D: DeviceDriver>: Send + Sync {
    /// The property's static descriptor
    fn descriptor(&self) -> &PropertyDescriptor;

    /// Read the physical value. `None` means the read produced nothing.
    async fn read(&self, driver: Arc<D>) -> Result<Option<Value>>;

    /// Write the physical value. The default rejects the write.
    async fn write(&self, driver: Arc<D>, value: Value) -> Result<()> {
        let _ = (driver, value);
        Err(DeviceError::PropertyNotWritable(self.descriptor().name.clone()))
    }
}

/// One action handler: descriptor plus invoker against the driver
#[async_trait]
pub trait DeviceAction<D: DeviceDriver>: Send + Sync {
    /// The action's static descriptor
    fn descriptor(&self) -> &ActionDescriptor;

    /// Invoke the action
    async fn execute(&self, driver: Arc<D>, argument: Option<Value>) -> Result<Option<Value>>;
}

type ReadFn<D> = Box<dyn Fn(Arc<D>) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>;
type WriteFn<D> = Box<dyn Fn(Arc<D>, Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type ExecuteFn<D> =
    Box<dyn Fn(Arc<D>, Option<Value>) -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync>;

/// Closure-backed read-only property
pub struct ReadOnlyProperty<D> {
    descriptor: PropertyDescriptor,
    read: ReadFn<D>,
}

impl<D: DeviceDriver> ReadOnlyProperty<D> {
    /// A read-only property backed by an async closure
    pub fn new<F, Fut>(name: impl Into<String>, read: F) -> Self
    where
        F: Fn(Arc<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Self {
            descriptor: PropertyDescriptor::new(name),
            read: Box::new(move |driver| Box::pin(read(driver))),
        }
    }

    /// Attach a human-readable description
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.descriptor.description = Some(text.into());
        self
    }
}

#[async_trait]
impl<D: DeviceDriver> DeviceProperty<D> for ReadOnlyProperty<D> {
    fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    async fn read(&self, driver: Arc<D>) -> Result<Option<Value>> {
        (self.read)(driver).await
    }
}

/// Closure-backed read/write property
pub struct MutableProperty<D> {
    descriptor: PropertyDescriptor,
    read: ReadFn<D>,
    write: WriteFn<D>,
}

impl<D: DeviceDriver> MutableProperty<D> {
    /// A mutable property backed by async read and write closures
    pub fn new<R, RFut, W, WFut>(name: impl Into<String>, read: R, write: W) -> Self
    where
        R: Fn(Arc<D>) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<Option<Value>>> + Send + 'static,
        W: Fn(Arc<D>, Value) -> WFut + Send + Sync + 'static,
        WFut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            descriptor: PropertyDescriptor::new(name).mutable(),
            read: Box::new(move |driver| Box::pin(read(driver))),
            write: Box::new(move |driver, value| Box::pin(write(driver, value))),
        }
    }

    /// Attach a human-readable description
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.descriptor.description = Some(text.into());
        self
    }
}

#[async_trait]
impl<D: DeviceDriver> DeviceProperty<D> for MutableProperty<D> {
    fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    async fn read(&self, driver: Arc<D>) -> Result<Option<Value>> {
        (self.read)(driver).await
    }

    async fn write(&self, driver: Arc<D>, value: Value) -> Result<()> {
        (self.write)(driver, value).await
    }
}

/// Closure-backed action
pub struct FnAction<D> {
    descriptor: ActionDescriptor,
    execute: ExecuteFn<D>,
}

impl<D: DeviceDriver> FnAction<D> {
    /// An action backed by an async closure
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(Arc<D>, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Self {
            descriptor: ActionDescriptor::new(name),
            execute: Box::new(move |driver, argument| Box::pin(execute(driver, argument))),
        }
    }

    /// Attach a human-readable description
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.descriptor.description = Some(text.into());
        self
    }
}

#[async_trait]
impl<D: DeviceDriver> DeviceAction<D> for FnAction<D> {
    fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, driver: Arc<D>, argument: Option<Value>) -> Result<Option<Value>> {
        (self.execute)(driver, argument).await
    }
}

type LogicalState = Arc<Mutex<HashMap<String, Value>>>;

/// Update the logical state under its lock and notify listeners when the
/// value actually moved.
async fn apply_update(
    logical: &LogicalState,
    messages: &broadcast::Sender<DeviceMessage>,
    property: &str,
    value: Value,
) {
    let mut state = logical.lock().await;
    if state.get(property) == Some(&value) {
        return;
    }
    let _previous = state.insert(property.to_string(), value.clone());
    drop(state);
    let _receivers = messages.send(DeviceMessage::property_changed(property, value, Name::empty()));
}

/// A [`Device`] built from a driver plus registered property and action
/// handlers, with a logical state cache between callers and the hardware.
pub struct DeviceBase<D: DeviceDriver> {
    label: String,
    driver: Arc<D>,
    meta: Value,
    properties: HashMap<String, Arc<dyn DeviceProperty<D>>>,
    actions: HashMap<String, Arc<dyn DeviceAction<D>>>,
    logical: LogicalState,
    messages: broadcast::Sender<DeviceMessage>,
    lifecycle: std::sync::Mutex<LifecycleState>,
    scope: CancellationToken,
}

impl<D: DeviceDriver> Debug for DeviceBase<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device[{}]", self.label)
    }
}

impl<D: DeviceDriver> DeviceBase<D> {
    /// Start building a device around `driver`
    pub fn builder(driver: D) -> DeviceBaseBuilder<D> {
        DeviceBaseBuilder {
            driver: Arc::new(driver),
            label: "device".to_string(),
            meta: Value::Null,
            properties: HashMap::new(),
            actions: HashMap::new(),
            message_buffer: DEFAULT_MESSAGE_BUFFER,
            scope: None,
        }
    }

    /// The driver this device wraps
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// The device's cancellation scope; background work owned by the
    /// device must be tied to it
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    fn set_lifecycle(&self, next: LifecycleState) {
        let mut state = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            *state = next;
            drop(state);
            let _receivers = self
                .messages
                .send(DeviceMessage::lifecycle(next, Name::empty()));
        }
    }

    /// Re-read `property` every `period` until the device stops.
    ///
    /// Each read refreshes the cache and pushes a change notification when
    /// the reading moved, which is how polling devices surface
    /// measurements.
    pub fn spawn_recurring_read(self: &Arc<Self>, property: impl Into<String>, period: Duration) {
        let property = property.into();
        let device = Arc::clone(self);
        let cancel = self.scope.clone();
        let _task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = device.read_property(&property).await {
                            warn!("{:?} recurring read of '{}' failed: {}", device, property, e);
                        }
                    }
                }
            }
        });
    }
}

/// Builder for [`DeviceBase`]
pub struct DeviceBaseBuilder<D: DeviceDriver> {
    driver: Arc<D>,
    label: String,
    meta: Value,
    properties: HashMap<String, Arc<dyn DeviceProperty<D>>>,
    actions: HashMap<String, Arc<dyn DeviceAction<D>>>,
    message_buffer: usize,
    scope: Option<CancellationToken>,
}

impl<D: DeviceDriver> DeviceBaseBuilder<D> {
    /// Human-readable device label used in logs
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Static device metadata returned by `describe`
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Register a property handler, keyed by its descriptor name
    pub fn property(mut self, property: impl DeviceProperty<D> + 'static) -> Self {
        let name = property.descriptor().name.clone();
        let _previous = self.properties.insert(name, Arc::new(property));
        self
    }

    /// Register an action handler, keyed by its descriptor name
    pub fn action(mut self, action: impl DeviceAction<D> + 'static) -> Self {
        let name = action.descriptor().name.clone();
        let _previous = self.actions.insert(name, Arc::new(action));
        self
    }

    /// Capacity of the notification broadcast channel
    pub fn message_buffer(mut self, capacity: usize) -> Self {
        self.message_buffer = capacity.max(1);
        self
    }

    /// Tie the device's cancellation scope to a parent scope
    pub fn scope(mut self, parent: &CancellationToken) -> Self {
        self.scope = Some(parent.child_token());
        self
    }

    /// Finish building. The device starts in the `Stopped` state.
    pub fn build(self) -> Arc<DeviceBase<D>> {
        let (messages, _rx) = broadcast::channel(self.message_buffer);
        Arc::new(DeviceBase {
            label: self.label,
            driver: self.driver,
            meta: self.meta,
            properties: self.properties,
            actions: self.actions,
            logical: Arc::new(Mutex::new(HashMap::new())),
            messages,
            lifecycle: std::sync::Mutex::new(LifecycleState::Stopped),
            scope: self.scope.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl<D: DeviceDriver> Device for DeviceBase<D> {
    fn describe(&self) -> Value {
        self.meta.clone()
    }

    fn property_descriptors(&self) -> Vec<PropertyDescriptor> {
        self.properties
            .values()
            .map(|property| property.descriptor().clone())
            .collect()
    }

    fn action_descriptors(&self) -> Vec<ActionDescriptor> {
        self.actions
            .values()
            .map(|action| action.descriptor().clone())
            .collect()
    }

    async fn read_property(&self, property: &str) -> Result<Value> {
        let handler = self
            .properties
            .get(property)
            .ok_or_else(|| DeviceError::PropertyNotFound(property.to_string()))?;
        let value = handler
            .read(self.driver.clone())
            .await?
            .ok_or_else(|| DeviceError::PropertyReadFailed(property.to_string()))?;
        apply_update(&self.logical, &self.messages, property, value.clone()).await;
        Ok(value)
    }

    async fn write_property(&self, property: &str, value: Value) -> Result<()> {
        // Bypass the write if the logical state already holds that value.
        {
            let state = self.logical.lock().await;
            if state.get(property) == Some(&value) {
                debug!("{:?} skipping write of '{}', value unchanged", self, property);
                return Ok(());
            }
        }

        match self.properties.get(property) {
            // No registered physical property with this name: a purely
            // logical write.
            None => {
                apply_update(&self.logical, &self.messages, property, value).await;
                Ok(())
            }
            Some(handler) if handler.descriptor().mutable => {
                // Invalidate before the physical write so concurrent
                // readers never see the stale value as current.
                self.invalidate(property).await;
                handler.write(self.driver.clone(), value).await?;

                // Converge the cache in the background unless the writer
                // already updated it.
                let property = property.to_string();
                let handler = handler.clone();
                let driver = self.driver.clone();
                let logical = self.logical.clone();
                let messages = self.messages.clone();
                let cancel = self.scope.clone();
                let label = self.label.clone();
                let _task = tokio::spawn(async move {
                    let read_back = async {
                        if logical.lock().await.contains_key(&property) {
                            return;
                        }
                        match handler.read(driver).await {
                            Ok(Some(value)) => {
                                apply_update(&logical, &messages, &property, value).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!("device[{}] read-back of '{}' failed: {}", label, property, e);
                            }
                        }
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = read_back => {}
                    }
                });
                Ok(())
            }
            Some(_) => Err(DeviceError::PropertyNotWritable(property.to_string())),
        }
    }

    async fn get_or_read_property(&self, property: &str) -> Result<Value> {
        match self.cached(property).await {
            Some(value) => Ok(value),
            None => self.read_property(property).await,
        }
    }

    async fn execute(&self, action: &str, argument: Option<Value>) -> Result<Option<Value>> {
        let handler = self
            .actions
            .get(action)
            .ok_or_else(|| DeviceError::ActionNotFound(action.to_string()))?;
        handler.execute(self.driver.clone(), argument).await
    }

    fn messages(&self) -> BoxStream<'static, DeviceMessage> {
        BroadcastStream::new(self.messages.subscribe())
            .filter_map(|message| async move { message.ok() })
            .boxed()
    }

    async fn start(&self) -> Result<()> {
        if self.lifecycle_state() != LifecycleState::Stopped {
            debug!("{:?} is already started", self);
            return Ok(());
        }
        self.set_lifecycle(LifecycleState::Starting);
        match self.driver.on_start().await {
            Ok(()) => {
                self.set_lifecycle(LifecycleState::Started);
                Ok(())
            }
            Err(e) => {
                self.set_lifecycle(LifecycleState::Error);
                Err(e)
            }
        }
    }

    fn stop(&self) {
        if self.lifecycle_state() == LifecycleState::Stopped {
            return;
        }
        self.set_lifecycle(LifecycleState::Stopped);
        self.driver.on_stop();
        self.scope.cancel();
    }

    fn lifecycle_state(&self) -> LifecycleState {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<D: DeviceDriver> CachingDevice for DeviceBase<D> {
    async fn cached(&self, property: &str) -> Option<Value> {
        self.logical.lock().await.get(property).cloned()
    }

    async fn invalidate(&self, property: &str) {
        let _previous = self.logical.lock().await.remove(property);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::RwLock;

    /// Driver whose "physical" reading advances on demand
    struct MeterDriver {
        reading: AtomicI64,
        setpoint: RwLock<Value>,
    }

    impl MeterDriver {
        fn new() -> Self {
            Self {
                reading: AtomicI64::new(0),
                setpoint: RwLock::new(Value::Int(0)),
            }
        }
    }

    #[async_trait]
    impl DeviceDriver for MeterDriver {}

    fn meter() -> Arc<DeviceBase<MeterDriver>> {
        DeviceBase::builder(MeterDriver::new())
            .label("meter")
            .meta(Value::object([("kind", Value::from("meter"))]))
            .property(ReadOnlyProperty::new("value", |driver: Arc<MeterDriver>| async move {
                Ok(Some(Value::Int(driver.reading.load(Ordering::SeqCst))))
            }))
            .property(MutableProperty::new(
                "setpoint",
                |driver: Arc<MeterDriver>| async move {
                    Ok(Some(driver.setpoint.read().await.clone()))
                },
                |driver: Arc<MeterDriver>, value| async move {
                    *driver.setpoint.write().await = value;
                    Ok(())
                },
            ))
            .action(FnAction::new("echo", |_driver, argument| async move {
                Ok(argument)
            }))
            .build()
    }

    #[tokio::test]
    async fn test_read_populates_cache() {
        let device = meter();
        device.driver().reading.store(5, Ordering::SeqCst);

        assert!(device.cached("value").await.is_none());
        let value = device.read_property("value").await.unwrap();
        assert_eq!(value, Value::Int(5));
        assert_eq!(device.cached("value").await, Some(Value::Int(5)));
    }

    #[tokio::test]
    async fn test_two_differing_reads_emit_two_notifications() {
        let device = meter();
        let mut notifications = device.messages();

        device.driver().reading.store(1, Ordering::SeqCst);
        device.read_property("value").await.unwrap();
        device.driver().reading.store(2, Ordering::SeqCst);
        device.read_property("value").await.unwrap();

        for expected in [1i64, 2] {
            match notifications.next().await.unwrap() {
                DeviceMessage::PropertyChanged { property, value, .. } => {
                    assert_eq!(property, "value");
                    assert_eq!(value, Value::Int(expected));
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_repeated_equal_reads_emit_once() {
        let device = meter();
        let mut notifications = device.messages();

        device.driver().reading.store(9, Ordering::SeqCst);
        device.read_property("value").await.unwrap();
        device.read_property("value").await.unwrap();
        device.driver().reading.store(10, Ordering::SeqCst);
        device.read_property("value").await.unwrap();

        let first = notifications.next().await.unwrap();
        let second = notifications.next().await.unwrap();
        match (&first, &second) {
            (
                DeviceMessage::PropertyChanged { value: v1, .. },
                DeviceMessage::PropertyChanged { value: v2, .. },
            ) => {
                assert_eq!(v1, &Value::Int(9));
                assert_eq!(v2, &Value::Int(10));
            }
            other => panic!("unexpected messages {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_then_read_is_consistent() {
        let device = meter();
        device.write_property("setpoint", Value::Int(42)).await.unwrap();
        let value = device.read_property("setpoint").await.unwrap();
        assert_eq!(value, Value::Int(42));
        assert_eq!(device.cached("setpoint").await, Some(Value::Int(42)));
    }

    #[tokio::test]
    async fn test_write_read_back_converges_cache() {
        let device = meter();
        device.write_property("setpoint", Value::Int(7)).await.unwrap();

        // The read-back runs asynchronously; poll until it converges.
        for _ in 0..50 {
            if device.cached("setpoint").await == Some(Value::Int(7)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cache did not converge to the written value");
    }

    #[tokio::test]
    async fn test_write_to_read_only_property_fails() {
        let device = meter();
        assert!(matches!(
            device.write_property("value", Value::Int(1)).await,
            Err(DeviceError::PropertyNotWritable(_))
        ));
    }

    #[tokio::test]
    async fn test_logical_write_for_unregistered_property() {
        let device = meter();
        let mut notifications = device.messages();

        device.write_property("note", Value::from("calibrating")).await.unwrap();
        assert_eq!(
            device.cached("note").await,
            Some(Value::from("calibrating"))
        );
        match notifications.next().await.unwrap() {
            DeviceMessage::PropertyChanged { property, .. } => assert_eq!(property, "note"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalidate_removes_without_notifying() {
        let device = meter();
        device.read_property("value").await.unwrap();
        let mut notifications = device.messages();

        device.invalidate("value").await;
        assert!(device.cached("value").await.is_none());

        // No notification should have been emitted by the invalidate.
        device.driver().reading.store(3, Ordering::SeqCst);
        device.read_property("value").await.unwrap();
        match notifications.next().await.unwrap() {
            DeviceMessage::PropertyChanged { value, .. } => assert_eq!(value, Value::Int(3)),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_property_and_action_are_loud() {
        let device = meter();
        assert!(matches!(
            device.read_property("missing").await,
            Err(DeviceError::PropertyNotFound(_))
        ));
        assert!(matches!(
            device.execute("missing", None).await,
            Err(DeviceError::ActionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_returns_action_result() {
        let device = meter();
        let result = device
            .execute("echo", Some(Value::from("ping")))
            .await
            .unwrap();
        assert_eq!(result, Some(Value::from("ping")));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions_emit_messages() {
        let device = meter();
        let mut notifications = device.messages();

        assert_eq!(device.lifecycle_state(), LifecycleState::Stopped);
        device.start().await.unwrap();
        assert_eq!(device.lifecycle_state(), LifecycleState::Started);
        device.start().await.unwrap();

        let states: Vec<LifecycleState> = vec![
            notifications.next().await.unwrap(),
            notifications.next().await.unwrap(),
        ]
        .into_iter()
        .map(|message| match message {
            DeviceMessage::LifeCycle { state, .. } => state,
            other => panic!("unexpected message {:?}", other),
        })
        .collect();
        assert_eq!(states, vec![LifecycleState::Starting, LifecycleState::Started]);

        device.stop();
        assert_eq!(device.lifecycle_state(), LifecycleState::Stopped);
        device.stop();
    }

    #[tokio::test]
    async fn test_recurring_read_stops_with_device() {
        let device = meter();
        device.driver().reading.store(11, Ordering::SeqCst);
        device.spawn_recurring_read("value", Duration::from_millis(10));

        for _ in 0..50 {
            if device.cached("value").await == Some(Value::Int(11)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(device.cached("value").await, Some(Value::Int(11)));

        device.stop();
        assert!(device.scope().is_cancelled());
    }
}
