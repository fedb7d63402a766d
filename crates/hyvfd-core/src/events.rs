//! Asynchronous drive event types.
//!
//! Events are emitted through a `tokio::sync::broadcast` channel when the
//! drive's observed state changes, so front ends can react without polling
//! the query methods.

/// An event emitted by the drive handle.
///
/// Delivery is best-effort through a bounded broadcast channel; slow
/// consumers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveEvent {
    /// A valid frequency reply was received.
    FrequencyChanged {
        /// Raw output frequency as reported by the drive.
        raw: u16,
        /// Output frequency converted to RPM.
        rpm: u16,
    },

    /// The transport was bound and the drive tasks started.
    Connected,

    /// A running task hit a transport error; the drive is now offline.
    Disconnected,
}
