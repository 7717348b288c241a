/*!
 * Self-healing port wrapper.
 *
 * [`ReconnectingPort`] presents a permanently usable [`Port`] backed by
 * zero or one real ports built on demand from a factory. When the
 * underlying port fails or its stream ends, the wrapper discards it and
 * rebuilds, with capped exponential backoff between attempts.
 */
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::port::{Port, PortError, Result};

/// Async factory producing a fresh underlying port
pub type PortBuilder = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Port>>> + Send + Sync>;

/// Backoff settings for reconnection attempts
#[derive(Debug, Clone)]
pub struct ReconnectOptions {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for the exponentially growing delay
    pub max_backoff: Duration,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
        }
    }
}

struct Inner {
    label: String,
    builder: PortBuilder,
    options: ReconnectOptions,
    current: Mutex<Option<Arc<dyn Port>>>,
    closed: AtomicBool,
}

impl Inner {
    /// Fetch the current underlying port, building one if absent or dead.
    ///
    /// The slot lock is held across the factory call so at most one
    /// underlying port is ever current; it is released before any I/O.
    async fn acquire(&self) -> Result<Arc<dyn Port>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PortError::Closed);
        }
        let mut current = self.current.lock().await;
        if let Some(port) = current.as_ref() {
            if port.is_open() {
                return Ok(port.clone());
            }
        }
        debug!("port[{}] building underlying port", self.label);
        let port = (self.builder)().await?;
        *current = Some(port.clone());
        Ok(port)
    }

    /// Drop and close the current underlying port if it is still `port`
    async fn discard(&self, port: &Arc<dyn Port>) {
        let mut current = self.current.lock().await;
        if let Some(existing) = current.as_ref() {
            if Arc::ptr_eq(existing, port) {
                existing.close();
                *current = None;
            }
        }
    }
}

/// A port that transparently rebuilds its transport on failure
#[derive(Clone)]
pub struct ReconnectingPort {
    inner: Arc<Inner>,
}

impl Debug for ReconnectingPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port[reconnecting:{}]", self.inner.label)
    }
}

impl ReconnectingPort {
    /// Wrap a port factory. No port is built until first use.
    pub fn new(label: impl Into<String>, builder: PortBuilder, options: ReconnectOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                builder,
                options,
                current: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Convenience constructor over an async closure
    pub fn from_factory<F, Fut>(label: impl Into<String>, factory: F, options: ReconnectOptions) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<dyn Port>>> + Send + 'static,
    {
        let builder: PortBuilder = Arc::new(move || Box::pin(factory()));
        Self::new(label, builder, options)
    }
}

#[async_trait]
impl Port for ReconnectingPort {
    /// Send through the current underlying port, building it if needed.
    ///
    /// Factory failures propagate to the sender; only the receive path
    /// retries indefinitely.
    async fn send(&self, data: Bytes) -> Result<()> {
        let port = self.inner.acquire().await?;
        port.send(data).await
    }

    /// An endless stream over the underlying port, transparently resuming
    /// across reconnects. The consumer never observes an error; failures
    /// surface as log warnings and a backoff pause.
    fn receiving(&self) -> BoxStream<'static, Bytes> {
        let inner = self.inner.clone();
        Box::pin(stream! {
            let mut backoff = inner.options.initial_backoff;
            loop {
                if inner.closed.load(Ordering::Acquire) {
                    break;
                }
                match inner.acquire().await {
                    Ok(port) => {
                        backoff = inner.options.initial_backoff;
                        let mut chunks = port.receiving();
                        while let Some(chunk) = chunks.next().await {
                            yield chunk;
                        }
                        if inner.closed.load(Ordering::Acquire) {
                            break;
                        }
                        warn!("port[{}] stream ended, reconnecting", inner.label);
                        inner.discard(&port).await;
                    }
                    Err(PortError::Closed) => break,
                    Err(e) => {
                        warn!("port[{}] reconnect failed: {}", inner.label, e);
                    }
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(inner.options.max_backoff);
            }
        })
    }

    fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire)
    }

    /// Mark the wrapper closed and schedule the underlying close
    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut current = inner.current.lock().await;
            if let Some(port) = current.take() {
                port.close();
            }
        });
    }
}
