/*!
 * Serial (COM) transport.
 *
 * The `serialport` handle is blocking, so both halves run their I/O inside
 * `spawn_blocking`, shuttling the handle in and out of the closure. Read
 * timeouts are treated as "no data yet", not as errors.
 */
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use devlink_core::value::Value;
use serialport::{DataBits, Parity, SerialPort as BlockingSerialPort, StopBits};
use tracing::debug;

use crate::port::{BufferedPort, ChannelReader, ChannelWriter, Port, PortError, PortOptions, Result};
use crate::registry::PortFactory;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial line settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub name: String,
    /// Baud rate, default 9600
    pub baud_rate: u32,
    /// Data bits per character, default 8
    pub data_bits: DataBits,
    /// Stop bits, default 1
    pub stop_bits: StopBits,
    /// Parity, default none
    pub parity: Parity,
}

impl SerialSettings {
    /// Settings for `name` with the conventional 9600-8-N-1 defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

struct SerialChannelReader {
    handle: Option<Box<dyn BlockingSerialPort>>,
}

#[async_trait]
impl ChannelReader for SerialChannelReader {
    async fn read(&mut self) -> io::Result<Option<Bytes>> {
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(None),
        };
        loop {
            let outcome = tokio::task::spawn_blocking(move || {
                let mut buf = [0u8; 1024];
                let result = handle.read(&mut buf);
                (handle, result, buf)
            })
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let (returned, result, buf) = outcome;
            handle = returned;
            match result {
                Ok(0) => {
                    return Ok(None);
                }
                Ok(n) => {
                    self.handle = Some(handle);
                    return Ok(Some(Bytes::copy_from_slice(&buf[..n])));
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

struct SerialChannelWriter {
    handle: Option<Box<dyn BlockingSerialPort>>,
}

#[async_trait]
impl ChannelWriter for SerialChannelWriter {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Err(io::Error::new(io::ErrorKind::NotConnected, "serial handle lost")),
        };
        let data = data.to_vec();
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = handle.write_all(&data).and_then(|()| handle.flush());
            (handle, result)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.handle = Some(returned);
        result
    }
}

/// Open a buffered port over a serial line
pub fn open(settings: &SerialSettings, options: PortOptions) -> Result<BufferedPort> {
    let handle = serialport::new(&settings.name, settings.baud_rate)
        .data_bits(settings.data_bits)
        .stop_bits(settings.stop_bits)
        .parity(settings.parity)
        .timeout(READ_TIMEOUT)
        .open()?;
    let reader_handle = handle.try_clone()?;
    debug!("Opened serial port {} at {} baud", settings.name, settings.baud_rate);

    Ok(BufferedPort::start(
        format!("serial:{}", settings.name),
        SerialChannelReader {
            handle: Some(reader_handle),
        },
        SerialChannelWriter {
            handle: Some(handle),
        },
        options,
    ))
}

/// Factory for `type = "serial"` port configurations.
///
/// Recognized keys: `name` (required), `baud_rate`, `data_bits`,
/// `stop_bits`, `parity` (`"none"`, `"odd"`, `"even"`).
#[derive(Debug, Default)]
pub struct SerialPortFactory;

#[async_trait]
impl PortFactory for SerialPortFactory {
    fn transport(&self) -> &str {
        "serial"
    }

    async fn build(&self, config: &Value) -> Result<Arc<dyn Port>> {
        let settings = settings_from_config(config)?;
        Ok(Arc::new(open(&settings, PortOptions::default())?))
    }
}

fn settings_from_config(config: &Value) -> Result<SerialSettings> {
    let name = config
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| PortError::Configuration("serial device name is not defined".to_string()))?;
    let mut settings = SerialSettings::new(name);

    if let Some(baud) = config.get("baud_rate").and_then(Value::as_int) {
        settings.baud_rate = u32::try_from(baud)
            .map_err(|_| PortError::Configuration(format!("invalid baud rate {}", baud)))?;
    }
    if let Some(bits) = config.get("data_bits").and_then(Value::as_int) {
        settings.data_bits = match bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(PortError::Configuration(format!("invalid data bits {}", other)));
            }
        };
    }
    if let Some(stop) = config.get("stop_bits").and_then(Value::as_int) {
        settings.stop_bits = match stop {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(PortError::Configuration(format!("invalid stop bits {}", other)));
            }
        };
    }
    if let Some(parity) = config.get("parity").and_then(Value::as_str) {
        settings.parity = match parity {
            "none" => Parity::None,
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            other => {
                return Err(PortError::Configuration(format!("invalid parity '{}'", other)));
            }
        };
    }
    Ok(settings)
}
