//! Serial port transport for drive communication.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for USB RS-485 adapters and physical serial ports.
//!
//! Huanyang drives speak an RTU-style protocol, factory set to 9600 baud,
//! 8 data bits, no parity, 1 stop bit. The baud rate is always taken from
//! configuration since drives are frequently re-jumpered in the field.
//!
//! # Example
//!
//! ```no_run
//! use hyvfd_transport::SerialTransport;
//! use hyvfd_core::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> hyvfd_core::Result<()> {
//! let transport = SerialTransport::open("/dev/ttyUSB0", 9600).await?;
//! let (mut reader, mut writer) = Box::new(transport).split();
//!
//! // Query the output frequency
//! writer.send(&[0x01, 0x04, 0x03, 0x01, 0x00, 0x00, 0xA1, 0x8E]).await?;
//!
//! let mut buf = [0u8; 16];
//! let n = reader.receive(&mut buf, Duration::from_millis(200)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use hyvfd_core::error::{Error, Result};
use hyvfd_core::transport::{Transport, TransportReader, TransportWriter};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial line settings.
///
/// Huanyang drives always use 8 data bits without flow control on RS-485;
/// the drive's communication parameters only select the baud rate, parity
/// and stop bits. Defaults match a factory-configured drive: 9600 8N1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate (4800, 9600, 19200 or 38400 on the drive's menu)
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Parity bit setting of the drive's RTU link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Stop bit setting of the drive's RTU link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl SerialConfig {
    /// Conventional short form, e.g. `8N1` or `8E2`.
    pub fn line_format(&self) -> String {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        format!("8{parity}{stop}")
    }

    fn serial_parity(&self) -> tokio_serial::Parity {
        match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }

    fn serial_stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Serial port transport to a drive.
pub struct SerialTransport {
    port: SerialStream,
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port with the given baud rate and 8N1 framing.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
    /// * `baud_rate` - Baud rate configured on the drive
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        let format = config.line_format();
        tracing::debug!(port = %port, baud_rate = config.baud_rate, %format, "Opening serial port");

        let serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(config.serial_parity())
            .stop_bits(config.serial_stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        tracing::info!(port = %port, baud_rate = config.baud_rate, %format, "Serial port opened");

        Ok(Self {
            port: serial_stream,
            port_name: port.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let SerialTransport { port, port_name } = *self;
        let (read_half, write_half) = tokio::io::split(port);
        let reader = SerialReader {
            port: read_half,
            port_name: port_name.clone(),
        };
        let writer = SerialWriter {
            port: Some(write_half),
            port_name,
        };
        (Box::new(reader), Box::new(writer))
    }
}

/// Receive half of a [`SerialTransport`].
pub struct SerialReader {
    port: ReadHalf<SerialStream>,
    port_name: String,
}

/// Send half of a [`SerialTransport`].
pub struct SerialWriter {
    port: Option<WriteHalf<SerialStream>>,
    port_name: String,
}

/// Map a serial I/O error, treating a vanished device as a lost connection.
fn classify_io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl TransportReader for SerialReader {
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match tokio::time::timeout(timeout, self.port.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::error!(port = %self.port_name, "Serial port reached end of stream");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to receive data"
                );
                Err(classify_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl TransportWriter for SerialWriter {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            classify_io_error(e)
        })?;

        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.line_format(), "8N1");
        assert_eq!(config.serial_parity(), tokio_serial::Parity::None);
        assert_eq!(config.serial_stop_bits(), tokio_serial::StopBits::One);
    }

    #[test]
    fn test_serial_config_even_parity_two_stop_bits() {
        let config = SerialConfig {
            baud_rate: 19200,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
        };
        assert_eq!(config.line_format(), "8E2");
        assert_eq!(config.serial_parity(), tokio_serial::Parity::Even);
        assert_eq!(config.serial_stop_bits(), tokio_serial::StopBits::Two);
    }

    #[test]
    fn test_serial_config_odd_parity() {
        let config = SerialConfig {
            parity: Parity::Odd,
            ..Default::default()
        };
        assert_eq!(config.line_format(), "8O1");
        assert_eq!(config.serial_parity(), tokio_serial::Parity::Odd);
    }

    #[test]
    fn test_classify_broken_pipe_as_connection_lost() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        assert!(matches!(classify_io_error(e), Error::ConnectionLost));
    }

    #[test]
    fn test_classify_other_io_error() {
        let e = std::io::Error::other("framing error");
        assert!(matches!(classify_io_error(e), Error::Io(_)));
    }

    #[tokio::test]
    async fn test_open_missing_port_is_transport_error() {
        let result = SerialTransport::open("/dev/hyvfd-does-not-exist", 9600).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
