//! DriveBuilder -- fluent builder for constructing [`Drive`] instances.
//!
//! Separates configuration from connection: the builder validates settings
//! and produces an idle [`Drive`], and [`Drive::open`] later binds the
//! serial port and starts the background tasks.
//!
//! # Example
//!
//! ```no_run
//! use hyvfd::DriveBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> hyvfd_core::Result<()> {
//! let drive = DriveBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .baud_rate(9600)
//!     .poll_interval(Duration::from_millis(500))
//!     .build()?;
//! drive.open().await?;
//! drive.command("M3 S12000");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use hyvfd_core::error::{Error, Result};
use hyvfd_transport::SerialConfig;

use crate::drive::Drive;
use crate::telemetry::FrameSync;

/// Default RPM to frequency-unit conversion factor.
pub const DEFAULT_HERTZ_PER_RPM: f64 = 3.47222;

/// Default interval between frequency queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(750);

/// Default silence kept on the line after every frame.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(110);

/// Default inter-byte gap that ends a received frame.
pub const DEFAULT_SILENCE_GAP: Duration = Duration::from_millis(50);

/// Default command queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Longest accepted poll interval. The liveness window is twice this.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Deepest accepted command queue (the limit of tokio's bounded channel).
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Immutable settings of a [`Drive`].
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Serial device path, required by [`Drive::open`].
    pub serial_port: Option<String>,
    /// Line settings for the serial port.
    pub serial: SerialConfig,
    /// Drive frequency units per spindle RPM.
    pub hertz_per_rpm: f64,
    /// Interval between automatic frequency queries. Also sets the
    /// liveness window (two intervals).
    pub poll_interval: Duration,
    /// Minimum silence after each transmitted frame.
    pub quiet_period: Duration,
    /// Inter-byte gap after which partial received bytes are discarded.
    pub silence_gap: Duration,
    /// Maximum number of queued command words.
    pub queue_capacity: usize,
    /// Reply resynchronization policy.
    pub frame_sync: FrameSync,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            serial_port: None,
            serial: SerialConfig::default(),
            hertz_per_rpm: DEFAULT_HERTZ_PER_RPM,
            poll_interval: DEFAULT_POLL_INTERVAL,
            quiet_period: DEFAULT_QUIET_PERIOD,
            silence_gap: DEFAULT_SILENCE_GAP,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            frame_sync: FrameSync::default(),
        }
    }
}

impl DriveConfig {
    fn validate(&self) -> Result<()> {
        if !self.hertz_per_rpm.is_finite() || self.hertz_per_rpm <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "hertz_per_rpm must be a positive number, got {}",
                self.hertz_per_rpm
            )));
        }
        if self.poll_interval.is_zero() || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(Error::InvalidParameter(format!(
                "poll_interval must be between 1ns and {:?}, got {:?}",
                MAX_POLL_INTERVAL, self.poll_interval
            )));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(Error::InvalidParameter(format!(
                "queue_capacity must be between 1 and {}, got {}",
                MAX_QUEUE_CAPACITY, self.queue_capacity
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::InvalidParameter(
                "baud_rate must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`Drive`].
///
/// Every setting has a working default, so the simplest usage is:
///
/// ```ignore
/// let drive = DriveBuilder::new().serial_port("/dev/ttyUSB0").build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DriveBuilder {
    config: DriveConfig,
}

impl DriveBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        DriveBuilder::default()
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.config.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 9600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.config.serial.baud_rate = baud;
        self
    }

    /// Replace all serial line settings.
    pub fn serial_config(mut self, serial: SerialConfig) -> Self {
        self.config.serial = serial;
        self
    }

    /// Set the RPM conversion factor (default: 3.47222).
    ///
    /// Must match the drive's pole count and frequency scaling.
    pub fn hertz_per_rpm(mut self, factor: f64) -> Self {
        self.config.hertz_per_rpm = factor;
        self
    }

    /// Set the frequency polling interval (default: 750ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the quiet period after each frame (default: 110ms).
    pub fn quiet_period(mut self, period: Duration) -> Self {
        self.config.quiet_period = period;
        self
    }

    /// Set the inter-byte silence that ends a reply (default: 50ms).
    pub fn silence_gap(mut self, gap: Duration) -> Self {
        self.config.silence_gap = gap;
        self
    }

    /// Set the command queue depth (default: 10).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Choose how received replies are located in the byte stream
    /// (default: [`FrameSync::SilenceGap`]).
    pub fn frame_sync(mut self, sync: FrameSync) -> Self {
        self.config.frame_sync = sync;
        self
    }

    /// Validate the settings and create an idle [`Drive`].
    ///
    /// Returns [`Error::InvalidParameter`] for a non-positive conversion
    /// factor or baud rate, and for a poll interval or queue capacity that is
    /// zero or above [`MAX_POLL_INTERVAL`] / [`MAX_QUEUE_CAPACITY`]. No port
    /// is opened until [`Drive::open`].
    pub fn build(self) -> Result<Drive> {
        self.config.validate()?;
        Ok(Drive::new(self.config))
    }
}
