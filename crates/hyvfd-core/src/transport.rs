//! Transport traits for drive communication.
//!
//! The drive link is full duplex: telemetry arrives while commands are being
//! written. A [`Transport`] is therefore split once, at open time, into a
//! [`TransportReader`] owned by the telemetry task and a [`TransportWriter`]
//! owned by the dispatcher task. Neither half is ever shared.
//!
//! Implementations exist for serial ports (`hyvfd-transport`) and for
//! deterministic unit testing (`MockTransport` in `hyvfd-test-harness`).

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// A duplex byte channel to a drive that can be split into owned halves.
pub trait Transport: Send + 'static {
    /// Consume the transport and return independent read and write halves.
    ///
    /// The underlying device is released once both halves are dropped, or
    /// when [`TransportWriter::close`] is called.
    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

/// Receive half of a [`Transport`].
#[async_trait]
pub trait TransportReader: Send {
    /// Receive bytes from the drive into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data;
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if nothing
    /// arrived within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// Send half of a [`Transport`].
#[async_trait]
pub trait TransportWriter: Send {
    /// Write a complete frame to the drive.
    ///
    /// Implementations should not return until every byte has been handed
    /// to the device.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and release the transport.
    ///
    /// After `close()`, further `send()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;
}
