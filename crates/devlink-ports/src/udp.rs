/*!
 * UDP transport.
 *
 * The socket is connected to a fixed remote address, so `send` maps to one
 * datagram per chunk and the listener only accepts datagrams from that
 * peer.
 */
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use devlink_core::value::Value;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::port::{BufferedPort, ChannelReader, ChannelWriter, Port, PortError, PortOptions, Result};
use crate::registry::PortFactory;

const MAX_DATAGRAM: usize = 64 * 1024;

struct UdpChannelReader {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl ChannelReader for UdpChannelReader {
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}

struct UdpChannelWriter {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl ChannelWriter for UdpChannelWriter {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(data).await?;
        if sent != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "datagram truncated on send",
            ));
        }
        Ok(())
    }
}

/// Connect a buffered port over UDP.
///
/// Binds `local_host:local_port` (any free local port when `None`) and
/// fixes the remote peer.
pub async fn connect(
    remote_host: &str,
    remote_port: u16,
    local_host: Option<&str>,
    local_port: Option<u16>,
    options: PortOptions,
) -> Result<BufferedPort> {
    let local = format!(
        "{}:{}",
        local_host.unwrap_or("0.0.0.0"),
        local_port.unwrap_or(0)
    );
    let socket = UdpSocket::bind(&local).await?;
    socket.connect((remote_host, remote_port)).await?;
    debug!("Connected UDP port to {}:{}", remote_host, remote_port);

    let socket = Arc::new(socket);
    Ok(BufferedPort::start(
        format!("udp:{}:{}", remote_host, remote_port),
        UdpChannelReader {
            socket: socket.clone(),
        },
        UdpChannelWriter { socket },
        options,
    ))
}

/// Factory for `type = "udp"` port configurations.
///
/// Recognized keys: `remote_host` (required), `remote_port` (required),
/// `local_host`, `local_port`.
#[derive(Debug, Default)]
pub struct UdpPortFactory;

#[async_trait]
impl PortFactory for UdpPortFactory {
    fn transport(&self) -> &str {
        "udp"
    }

    async fn build(&self, config: &Value) -> Result<Arc<dyn Port>> {
        let remote_host = config
            .get("remote_host")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PortError::Configuration("remote host for UDP port is not defined".to_string())
            })?
            .to_string();
        let remote_port = config
            .get("remote_port")
            .and_then(Value::as_int)
            .ok_or_else(|| {
                PortError::Configuration("remote port for UDP port is not defined".to_string())
            })?;
        let remote_port = u16::try_from(remote_port).map_err(|_| {
            PortError::Configuration(format!("invalid UDP port number {}", remote_port))
        })?;
        let local_host = config.get("local_host").and_then(Value::as_str).map(str::to_string);
        let local_port = config
            .get("local_port")
            .and_then(Value::as_int)
            .and_then(|p| u16::try_from(p).ok());

        Ok(Arc::new(
            connect(
                &remote_host,
                remote_port,
                local_host.as_deref(),
                local_port,
                PortOptions::default(),
            )
            .await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_udp_round_trip() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let port = connect(
            "127.0.0.1",
            peer_addr.port(),
            Some("127.0.0.1"),
            None,
            PortOptions::default(),
        )
        .await
        .unwrap();

        port.send_text("marco").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"marco");

        peer.send_to(b"polo", from).await.unwrap();
        let chunk = port.receiving().next().await.unwrap();
        assert_eq!(&chunk[..], b"polo");
    }

    #[tokio::test]
    async fn test_factory_requires_remote_keys() {
        let factory = UdpPortFactory;
        let config = Value::object([("remote_host", Value::from("localhost"))]);
        assert!(matches!(
            factory.build(&config).await,
            Err(PortError::Configuration(_))
        ));
    }
}
