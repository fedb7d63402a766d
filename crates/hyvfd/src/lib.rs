//! hyvfd -- asynchronous protocol engine for Huanyang variable frequency
//! drives.
//!
//! Translates spindle G-code words (`M3`, `M4`, `M5`, `S<rpm>`, `?`) into
//! the drive's CRC-signed serial frames, paces them onto the line, and
//! listens for the drive's replies to keep a live view of output speed and
//! link health.
//!
//! # Quick start
//!
//! ```no_run
//! use hyvfd::DriveBuilder;
//!
//! # async fn example() -> hyvfd_core::Result<()> {
//! let drive = DriveBuilder::new().serial_port("/dev/ttyUSB0").build()?;
//! drive.open().await?;
//!
//! drive.command("M3 S12000");
//! if drive.online() && drive.processed().processed {
//!     println!("spindle at {} rpm", drive.output_rpm());
//! }
//!
//! drive.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod commands;
pub(crate) mod dispatcher;
pub mod drive;
pub(crate) mod poller;
pub mod state;
pub mod telemetry;

pub use builder::{DriveBuilder, DriveConfig};
pub use commands::Command;
pub use drive::Drive;
pub use state::Processed;
pub use telemetry::{FrameAssembler, FrameSync};

pub use hyvfd_core::{DriveEvent, Error, Result};
