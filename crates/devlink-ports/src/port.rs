/*!
 * Port trait and the buffered port implementation.
 *
 * A [`Port`] is a raw bidirectional byte-stream endpoint to a device.
 * [`BufferedPort`] provides the common machinery every transport shares:
 * a bounded outgoing queue drained by a dedicated task, and an inbound
 * buffer with an explicit overflow policy.
 */
use std::fmt::Debug;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use std::collections::VecDeque;

/// Error type for port operations
#[derive(Error, Debug)]
pub enum PortError {
    /// The port has been closed and cannot transfer data any more
    #[error("Port is closed")]
    Closed,

    /// The port configuration is missing or invalid
    #[error("Port configuration error: {0}")]
    Configuration(String),

    /// No factory is registered for the requested transport type
    #[error("Unknown transport type: {0}")]
    UnknownTransport(String),

    /// The response stream ended before a complete response arrived
    #[error("Port stream ended before a response was received")]
    NoResponse,

    /// Error from the underlying transport
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// Error from the serial transport library
    #[cfg(feature = "serial")]
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] devlink_core::error::Error),
}

/// Result type for port operations
pub type Result<T> = std::result::Result<T, PortError>;

/// A bidirectional byte-stream endpoint to a device
#[async_trait]
pub trait Port: Send + Sync + Debug {
    /// Enqueue a data packet for asynchronous transmission.
    ///
    /// Suspends when the outgoing queue is full. Transmission order is the
    /// call order of `send`.
    async fn send(&self, data: Bytes) -> Result<()>;

    /// A lazy stream of incoming chunks.
    ///
    /// Chunks are not guaranteed to be complete phrases; use
    /// [`crate::phrases::with_delimiter`] on top to form phrases. The
    /// stream may be obtained more than once; all streams drain the same
    /// inbound buffer.
    fn receiving(&self) -> BoxStream<'static, Bytes>;

    /// Whether the port can still transfer data
    fn is_open(&self) -> bool;

    /// Release the port's resources. Idempotent.
    fn close(&self);

    /// Send a UTF-8 encoded string
    async fn send_text(&self, text: &str) -> Result<()> {
        self.send(Bytes::copy_from_slice(text.as_bytes())).await
    }
}

/// Reading half of a transport byte channel
#[async_trait]
pub trait ChannelReader: Send + 'static {
    /// Read the next chunk. `None` means the channel reached end of stream.
    async fn read(&mut self) -> io::Result<Option<Bytes>>;
}

/// Writing half of a transport byte channel
#[async_trait]
pub trait ChannelWriter: Send + 'static {
    /// Write one chunk completely
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// [`ChannelReader`] over any [`AsyncRead`] stream
pub struct IoChannelReader<R> {
    inner: R,
}

impl<R> IoChannelReader<R> {
    /// Wrap an [`AsyncRead`] stream
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> ChannelReader for IoChannelReader<R> {
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = BytesMut::with_capacity(4096);
        let n = self.inner.read_buf(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(buf.freeze()))
        }
    }
}

/// [`ChannelWriter`] over any [`AsyncWrite`] stream
pub struct IoChannelWriter<W> {
    inner: W,
}

impl<W> IoChannelWriter<W> {
    /// Wrap an [`AsyncWrite`] stream
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> ChannelWriter for IoChannelWriter<W> {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }
}

/// What to do with a new inbound chunk when the inbound buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the oldest unconsumed chunk to make room (latest value wins)
    DropOldest,
    /// Drop the newly arrived chunk
    DropNewest,
}

/// Options controlling the buffering behavior of a [`BufferedPort`]
#[derive(Debug, Clone)]
pub struct PortOptions {
    /// Capacity of the outgoing queue; `send` suspends when it is full
    pub outgoing_capacity: usize,
    /// Capacity of the inbound buffer
    pub inbound_capacity: usize,
    /// Policy applied when the inbound buffer is full.
    ///
    /// The default (`DropOldest` with capacity 1) keeps only the freshest
    /// unconsumed chunk. That suits status polling, where a stale reading
    /// has no value, but silently drops data under load; raise
    /// `inbound_capacity` for transports where every chunk matters.
    pub inbound_overflow: OverflowPolicy,
    /// Optional parent scope; cancelling it closes the port
    pub scope: Option<CancellationToken>,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            outgoing_capacity: 100,
            inbound_capacity: 1,
            inbound_overflow: OverflowPolicy::DropOldest,
            scope: None,
        }
    }
}

/// Bounded inbound chunk buffer shared between the listener task and
/// `receiving()` streams.
struct InboundBuffer {
    queue: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    overflow: OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
}

impl InboundBuffer {
    fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            overflow,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, chunk: Bytes) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= self.capacity {
                match self.overflow {
                    OverflowPolicy::DropOldest => {
                        let dropped = queue.pop_front();
                        trace!(
                            "Inbound buffer full, dropping oldest chunk of {} bytes",
                            dropped.map(|b| b.len()).unwrap_or(0)
                        );
                    }
                    OverflowPolicy::DropNewest => {
                        trace!("Inbound buffer full, dropping newest chunk of {} bytes", chunk.len());
                        return;
                    }
                }
            }
            queue.push_back(chunk);
        }
        self.notify.notify_one();
    }

    async fn pop(self: &Arc<Self>) -> Option<Bytes> {
        loop {
            {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(chunk) = queue.pop_front() {
                    return Some(chunk);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// A port with a buffered outgoing queue and a policy-driven inbound buffer.
///
/// Transports supply the raw [`ChannelReader`]/[`ChannelWriter`] pair; the
/// buffered port owns the drain and listener tasks and ties their lifetime
/// to a cancellation scope.
pub struct BufferedPort {
    label: String,
    outgoing: mpsc::Sender<Bytes>,
    inbound: Arc<InboundBuffer>,
    cancel: CancellationToken,
}

impl Debug for BufferedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port[{}]", self.label)
    }
}

impl BufferedPort {
    /// Start the port over a reader/writer channel pair.
    ///
    /// Spawns the drain and listener tasks immediately; they stop when the
    /// port (or the parent scope in [`PortOptions::scope`]) is cancelled,
    /// or when the reader reaches end of stream or fails.
    pub fn start<R, W>(label: impl Into<String>, reader: R, mut writer: W, options: PortOptions) -> Self
    where
        R: ChannelReader,
        W: ChannelWriter,
    {
        let label = label.into();
        let cancel = match &options.scope {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (outgoing, mut outgoing_rx) = mpsc::channel::<Bytes>(options.outgoing_capacity.max(1));
        let inbound = Arc::new(InboundBuffer::new(
            options.inbound_capacity,
            options.inbound_overflow,
        ));

        // Drain task: transmit queued chunks in FIFO order. A failed write
        // is logged and skipped; only cancellation stops the loop.
        {
            let cancel = cancel.clone();
            let label = label.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = outgoing_rx.recv() => match next {
                            Some(data) => match writer.write(&data).await {
                                Ok(()) => debug!("port[{}] SENT: {} bytes", label, data.len()),
                                Err(e) => error!("port[{}] error while writing data: {}", label, e),
                            },
                            None => break,
                        },
                    }
                }
            });
        }

        // Listener task: feed received chunks into the inbound buffer. A
        // read failure or end of stream terminates the whole port.
        {
            let cancel = cancel.clone();
            let inbound = inbound.clone();
            let label = label.clone();
            let mut reader = reader;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        chunk = reader.read() => match chunk {
                            Ok(Some(data)) => {
                                debug!("port[{}] RECEIVED: {} bytes", label, data.len());
                                inbound.push(data);
                            }
                            Ok(None) => {
                                debug!("port[{}] reached end of stream", label);
                                break;
                            }
                            Err(e) => {
                                warn!("port[{}] read failed: {}", label, e);
                                break;
                            }
                        },
                    }
                }
                cancel.cancel();
                inbound.close();
            });
        }

        Self {
            label,
            outgoing,
            inbound,
            cancel,
        }
    }

    /// The human-readable transport label, e.g. `tcp:localhost:4001`
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl Port for BufferedPort {
    async fn send(&self, data: Bytes) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PortError::Closed);
        }
        self.outgoing.send(data).await.map_err(|_| PortError::Closed)
    }

    fn receiving(&self) -> BoxStream<'static, Bytes> {
        let inbound = self.inbound.clone();
        Box::pin(stream::unfold(inbound, |inbound| async move {
            inbound.pop().await.map(|chunk| (chunk, inbound))
        }))
    }

    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn close(&self) {
        self.cancel.cancel();
        self.inbound.close();
    }
}

impl Drop for BufferedPort {
    fn drop(&mut self) {
        self.close();
    }
}
