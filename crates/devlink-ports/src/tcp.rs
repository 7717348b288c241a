/*!
 * TCP transport.
 */
use std::sync::Arc;

use async_trait::async_trait;
use devlink_core::value::Value;
use tokio::net::TcpStream;
use tracing::debug;

use crate::port::{BufferedPort, IoChannelReader, IoChannelWriter, Port, PortError, PortOptions, Result};
use crate::registry::PortFactory;

/// Connect a buffered port over TCP
pub async fn connect(host: &str, port: u16, options: PortOptions) -> Result<BufferedPort> {
    let stream = TcpStream::connect((host, port)).await?;
    debug!("Connected TCP port to {}:{}", host, port);
    let (read_half, write_half) = stream.into_split();
    Ok(BufferedPort::start(
        format!("tcp:{}:{}", host, port),
        IoChannelReader::new(read_half),
        IoChannelWriter::new(write_half),
        options,
    ))
}

/// Factory for `type = "tcp"` port configurations.
///
/// Recognized keys: `host` (default `localhost`), `port` (required).
#[derive(Debug, Default)]
pub struct TcpPortFactory;

#[async_trait]
impl PortFactory for TcpPortFactory {
    fn transport(&self) -> &str {
        "tcp"
    }

    async fn build(&self, config: &Value) -> Result<Arc<dyn Port>> {
        let host = config
            .get("host")
            .and_then(Value::as_str)
            .unwrap_or("localhost")
            .to_string();
        let port = config
            .get("port")
            .and_then(Value::as_int)
            .ok_or_else(|| {
                PortError::Configuration("port value for TCP port is not defined".to_string())
            })?;
        let port = u16::try_from(port)
            .map_err(|_| PortError::Configuration(format!("invalid TCP port number {}", port)))?;
        Ok(Arc::new(connect(&host, port, PortOptions::default()).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            socket.write_all(b"world").await.unwrap();
        });

        let port = connect("127.0.0.1", addr.port(), PortOptions::default())
            .await
            .unwrap();
        port.send_text("hello").await.unwrap();

        let chunk = port.receiving().next().await.unwrap();
        assert_eq!(&chunk[..], b"world");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_factory_requires_port_key() {
        let factory = TcpPortFactory;
        let config = Value::object([("host", Value::from("localhost"))]);
        assert!(matches!(
            factory.build(&config).await,
            Err(PortError::Configuration(_))
        ));
    }
}
