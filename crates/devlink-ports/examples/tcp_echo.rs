use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;

use devlink_ports::{
    tcp, Port, PortOptions, ReconnectOptions, ReconnectingPort, SynchronousPort,
};

/// A line-oriented echo instrument on localhost, driven through a
/// reconnecting synchronous port.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    devlink_core::logging::init_with_filter("debug")?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // The "instrument": answers every \n-terminated line with OK:<line>.
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buf = [0u8; 256];
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    pending.extend_from_slice(&buf[..n]);
                    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        let mut reply = b"OK:".to_vec();
                        reply.extend_from_slice(&line);
                        if socket.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    let host = addr.ip().to_string();
    let port = addr.port();
    let reconnecting = ReconnectingPort::from_factory(
        format!("tcp:{}:{}", host, port),
        move || {
            let host = host.clone();
            async move {
                Ok(Arc::new(tcp::connect(&host, port, PortOptions::default()).await?)
                    as Arc<dyn Port>)
            }
        },
        ReconnectOptions::default(),
    );

    let instrument = SynchronousPort::new(Arc::new(reconnecting));
    for command in ["*IDN?", "MEAS:VOLT?", "SYST:ERR?"] {
        let request = format!("{}\n", command);
        let reply = instrument.respond_text_with_delimiter(&request, "\n").await?;
        info!("{} -> {}", command, reply.trim_end());
    }

    instrument.close();
    Ok(())
}
