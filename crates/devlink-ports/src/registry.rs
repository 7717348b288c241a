/*!
 * Port factory registry.
 *
 * Maps a transport `type` key to the factory that can build it, and caches
 * built ports by their configuration record so two consumers asking for
 * the same endpoint share one port. The registry is an explicit object
 * passed by reference; it owns the shutdown of every port it built.
 */
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use devlink_core::value::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::port::{Port, PortError, Result};

/// Builder of ports for one transport type
#[async_trait]
pub trait PortFactory: Send + Sync {
    /// The `type` key this factory answers to, e.g. `"tcp"`
    fn transport(&self) -> &str;

    /// Build a port from a configuration record
    async fn build(&self, config: &Value) -> Result<Arc<dyn Port>>;
}

/// Registry of transport factories and the ports built from them
pub struct PortRegistry {
    factories: HashMap<String, Arc<dyn PortFactory>>,
    cache: Mutex<HashMap<String, Arc<dyn Port>>>,
}

impl PortRegistry {
    /// An empty registry with no transports
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A registry with the built-in transports registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::tcp::TcpPortFactory));
        registry.register(Arc::new(crate::udp::UdpPortFactory));
        #[cfg(feature = "serial")]
        registry.register(Arc::new(crate::serial::SerialPortFactory));
        registry
    }

    /// Register a transport factory, replacing any previous one of the
    /// same type
    pub fn register(&mut self, factory: Arc<dyn PortFactory>) {
        let _previous = self.factories.insert(factory.transport().to_string(), factory);
    }

    /// Get the cached port for this configuration, building it on first use.
    ///
    /// The cache key is the canonical JSON of the configuration record, so
    /// identical records share one port. A cached port that has died is
    /// rebuilt.
    pub async fn get_or_build(&self, config: &Value) -> Result<Arc<dyn Port>> {
        let transport = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| PortError::Configuration("port type is not defined".to_string()))?;
        let factory = self
            .factories
            .get(transport)
            .ok_or_else(|| PortError::UnknownTransport(transport.to_string()))?;

        let key = serde_json::to_string(config)
            .map_err(|e| PortError::Configuration(format!("unencodable port config: {}", e)))?;

        let mut cache = self.cache.lock().await;
        if let Some(port) = cache.get(&key) {
            if port.is_open() {
                return Ok(port.clone());
            }
            debug!("Cached {} port is closed, rebuilding", transport);
        }
        let port = factory.build(config).await?;
        let _previous = cache.insert(key, port.clone());
        Ok(port)
    }

    /// Close every port this registry built
    pub async fn close_all(&self) {
        let mut cache = self.cache.lock().await;
        for (_, port) in cache.drain() {
            port.close();
        }
        info!("Closed all registry ports");
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream::{self, BoxStream};
    use futures::StreamExt;
    use std::fmt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakePort {
        open: AtomicBool,
    }

    impl fmt::Debug for FakePort {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "port[fake]")
        }
    }

    #[async_trait]
    impl Port for FakePort {
        async fn send(&self, _data: Bytes) -> Result<()> {
            Ok(())
        }

        fn receiving(&self) -> BoxStream<'static, Bytes> {
            stream::empty().boxed()
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }

        fn close(&self) {
            self.open.store(false, Ordering::Release);
        }
    }

    struct FakeFactory {
        builds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PortFactory for FakeFactory {
        fn transport(&self) -> &str {
            "fake"
        }

        async fn build(&self, _config: &Value) -> Result<Arc<dyn Port>> {
            let _count = self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakePort {
                open: AtomicBool::new(true),
            }))
        }
    }

    fn fake_registry() -> (PortRegistry, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let mut registry = PortRegistry::new();
        registry.register(Arc::new(FakeFactory {
            builds: builds.clone(),
        }));
        (registry, builds)
    }

    #[tokio::test]
    async fn test_same_config_shares_one_port() {
        let (registry, builds) = fake_registry();
        let config = Value::object([("type", Value::from("fake")), ("slot", Value::from(1))]);

        let first = registry.get_or_build(&config).await.unwrap();
        let second = registry.get_or_build(&config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_port_is_rebuilt() {
        let (registry, builds) = fake_registry();
        let config = Value::object([("type", Value::from("fake"))]);

        let first = registry.get_or_build(&config).await.unwrap();
        first.close();
        let second = registry.get_or_build(&config).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_transport_fails() {
        let (registry, _builds) = fake_registry();
        let config = Value::object([("type", Value::from("pigeon"))]);
        assert!(matches!(
            registry.get_or_build(&config).await,
            Err(PortError::UnknownTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_type_fails() {
        let (registry, _builds) = fake_registry();
        let config = Value::object([("host", Value::from("localhost"))]);
        assert!(matches!(
            registry.get_or_build(&config).await,
            Err(PortError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_config_file_records_build_ports() {
        let config = devlink_core::config::CoreConfig::from_toml(
            r#"
            [ports.probe]
            type = "fake"
            slot = 2
            "#,
        )
        .unwrap();
        let (registry, builds) = fake_registry();

        let record = config.ports.get("probe").unwrap();
        let port = registry.get_or_build(record).await.unwrap();
        assert!(port.is_open());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_all_closes_built_ports() {
        let (registry, _builds) = fake_registry();
        let config = Value::object([("type", Value::from("fake"))]);
        let port = registry.get_or_build(&config).await.unwrap();
        registry.close_all().await;
        assert!(!port.is_open());
    }
}
