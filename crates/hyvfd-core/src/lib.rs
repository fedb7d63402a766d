//! hyvfd-core: Core traits, events, and error definitions for hyvfd.
//!
//! This crate holds the pieces shared by the protocol engine, the serial
//! transport, and the test harness, so none of them depend on each other.
//!
//! # Key types
//!
//! - [`Transport`] -- duplex byte channel, split into [`TransportReader`] and [`TransportWriter`]
//! - [`DriveEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;

pub use error::{Error, Result};
pub use events::DriveEvent;
pub use transport::{Transport, TransportReader, TransportWriter};
