//! Transport implementations for hyvfd.
//!
//! This crate provides [`SerialTransport`], the concrete implementation of
//! the [`Transport`](hyvfd_core::Transport) trait for USB RS-485 adapters and
//! physical serial ports.
//!
//! # Example
//!
//! ```no_run
//! use hyvfd_transport::{Parity, SerialConfig, SerialTransport};
//!
//! # async fn example() -> hyvfd_core::Result<()> {
//! let config = SerialConfig {
//!     baud_rate: 19200,
//!     parity: Parity::Even,
//!     ..Default::default()
//! };
//! let transport = SerialTransport::open_with_config("/dev/ttyUSB0", config).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{Parity, SerialConfig, SerialReader, SerialTransport, SerialWriter, StopBits};
