//! # Serial Communication Module
//!
//! Handles the half-duplex radio-serial link to the payload.
//!
//! This module handles:
//! - Opening the serial port with the configured baud rate and parity
//! - Non-blocking reads of whatever the radio has delivered
//! - Queueing uplink frames from the HTTP surface ([`SerialSender`])
//! - A simulated link for running without hardware ([`simulated`])

pub mod port_trait;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use crate::codec::{Packet, PacketCodec};
use crate::config::{ParityMode, SerialConfig};
use crate::error::{Result, TelemetryError};
pub use port_trait::SerialPortIO;

/// Device paths probed when the configured port is `auto` (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial radio modules
    "/dev/ttyACM0", // USB CDC devices
];

/// Ground-station radio serial port
pub struct TelemetrySerial {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
    timeout: Duration,
}

impl std::fmt::Debug for TelemetrySerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySerial")
            .field("device_path", &self.device_path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TelemetrySerial {
    /// Open the port named in `config`
    ///
    /// A port of `auto` probes the common device paths.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::SerialPortNotFound`] if no candidate opens
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use groundlink::config::SerialConfig;
    /// use groundlink::serial::TelemetrySerial;
    ///
    /// let serial = TelemetrySerial::open(&SerialConfig::default())?;
    /// println!("Listening on {}", serial.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        if config.port == "auto" {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, config)
        } else {
            Self::open_with_paths(&[config.port.as_str()], config)
        }
    }

    /// Open the first of `paths` that succeeds
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `config` - Baud rate, parity and timeout to apply
    pub fn open_with_paths(paths: &[&str], config: &SerialConfig) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, config) {
                Ok(port) => {
                    info!(
                        "Opened serial port {} at {} baud ({:?} parity)",
                        path, config.baud_rate, config.parity
                    );
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                        timeout: Duration::from_millis(config.timeout_ms),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(TelemetryError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port (8N1, no flow control, configured parity)
    fn open_port(path: &str, config: &SerialConfig) -> Result<tokio_serial::SerialStream> {
        let parity = match config.parity {
            ParityMode::None => tokio_serial::Parity::None,
            ParityMode::Odd => tokio_serial::Parity::Odd,
            ParityMode::Even => tokio_serial::Parity::Even,
        };

        let port = tokio_serial::new(path, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(parity)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open_native_async()
            .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl SerialPortIO for TelemetrySerial {
    async fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use tokio::io::AsyncReadExt;

        let waiting = self.port.bytes_to_read().map_err(std::io::Error::from)? as usize;
        if waiting == 0 {
            return Ok(0);
        }

        let len = waiting.min(buf.len());
        match tokio::time::timeout(self.timeout, self.port.read(&mut buf[..len])).await {
            Ok(read) => read,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "serial read timed out",
            )),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        match tokio::time::timeout(self.timeout, self.port.write_all(data)).await {
            Ok(written) => written,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "serial write timed out",
            )),
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}

/// Receiving end of the uplink queue, drained by the ingestion loop
pub type UplinkQueue = mpsc::Receiver<Bytes>;

/// Cloneable handle for queueing uplink frames onto the serial link
#[derive(Debug, Clone)]
pub struct SerialSender {
    tx: mpsc::Sender<Bytes>,
}

impl SerialSender {
    /// Create a sender and the queue the ingestion loop drains
    pub fn channel(capacity: usize) -> (Self, UplinkQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Encode `packet` and queue it for transmission
    ///
    /// Returns the encoded frame.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::Codec`] if the packet cannot be encoded,
    /// [`TelemetryError::SenderUnavailable`] if the ingestion loop has stopped
    /// or its queue is full.
    pub fn send_packet(&self, codec: &dyn PacketCodec, packet: &Packet) -> Result<Bytes> {
        let frame = Bytes::from(codec.encode(packet)?);
        self.tx.try_send(frame.clone()).map_err(|e| {
            warn!("Uplink frame rejected: {}", e);
            TelemetryError::SenderUnavailable
        })?;
        debug!(
            device = ?packet.device_id,
            len = frame.len(),
            "Queued uplink frame"
        );
        Ok(frame)
    }
}
