/*!
 * Request/response serialization over a shared port.
 *
 * [`SynchronousPort`] guarantees that one request's response window is
 * never interleaved with another's. It does not, and cannot, stop other
 * code from reading the underlying port outside the wrapper; the caller
 * must hand the port to exactly one controller.
 */
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::phrases::{with_delimiter, with_string_delimiter};
use crate::port::{Port, PortError, Result};

/// A port wrapper serializing request/response exchanges
pub struct SynchronousPort {
    port: Arc<dyn Port>,
    lock: Mutex<()>,
}

impl Debug for SynchronousPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port[sync:{:?}]", self.port)
    }
}

impl SynchronousPort {
    /// Wrap a port. The wrapper assumes exclusive use of the port.
    pub fn new(port: Arc<dyn Port>) -> Self {
        Self {
            port,
            lock: Mutex::new(()),
        }
    }

    /// Send a request, then evaluate `transform` over the incoming stream
    /// while holding the exchange lock. Concurrent callers wait their turn.
    pub async fn respond<T, F, Fut>(&self, request: Bytes, transform: F) -> Result<T>
    where
        F: FnOnce(BoxStream<'static, Bytes>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let _exchange = self.lock.lock().await;
        self.port.send(request).await?;
        transform(self.port.receiving()).await
    }

    /// Send a request and return the first complete phrase of the response
    pub async fn respond_with_delimiter(
        &self,
        request: Bytes,
        delimiter: impl Into<Vec<u8>>,
    ) -> Result<Bytes> {
        let delimiter = delimiter.into();
        self.respond(request, move |incoming| async move {
            let mut phrases = with_delimiter(incoming, delimiter)?;
            phrases.next().await.ok_or(PortError::NoResponse)
        })
        .await
    }

    /// Send a UTF-8 request and return the first complete UTF-8 phrase
    pub async fn respond_text_with_delimiter(&self, request: &str, delimiter: &str) -> Result<String> {
        let delimiter = delimiter.to_string();
        self.respond(
            Bytes::copy_from_slice(request.as_bytes()),
            move |incoming| async move {
                let mut phrases = with_string_delimiter(incoming, &delimiter)?;
                phrases.next().await.ok_or(PortError::NoResponse)
            },
        )
        .await
    }
}

#[async_trait]
impl Port for SynchronousPort {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.port.send(data).await
    }

    fn receiving(&self) -> BoxStream<'static, Bytes> {
        self.port.receiving()
    }

    fn is_open(&self) -> bool {
        self.port.is_open()
    }

    fn close(&self) {
        self.port.close()
    }
}
