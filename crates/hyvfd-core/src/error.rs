//! Error types for hyvfd.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, frame validation
//! failures, command parse failures, and queue backpressure are all captured
//! here.

/// The error type for all hyvfd operations.
///
/// Only transport open failures are surfaced to callers as hard errors.
/// The rest are either reported through a boolean (queue backpressure),
/// degrade the drive to an offline state (I/O inside a running task), or
/// are logged and discarded (bad frames, unknown command words).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not be opened (missing device, permissions, bad settings).
    #[error("transport error: {0}")]
    Transport(String),

    /// A received frame failed header or checksum validation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A command word was not recognized.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The command queue had no free slot for the submitted word.
    #[error("command queue full")]
    QueueFull,

    /// Timed out waiting for data from the drive.
    #[error("timeout waiting for data")]
    Timeout,

    /// An invalid configuration value was supplied.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No transport is bound, or the command queue is gone.
    #[error("not connected")]
    NotConnected,

    /// The link to the drive was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The drive handle was closed and cannot be reopened.
    #[error("drive handle closed")]
    Closed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
