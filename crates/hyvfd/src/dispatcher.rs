//! Command queue and the dispatcher task.
//!
//! All outgoing traffic flows through one bounded queue of normalized
//! command words. Submission never waits: a word that finds the queue full
//! is dropped and the caller is told via the return value. A single
//! dispatcher task drains the queue in order, encodes each word, writes the
//! frame, and then holds the line quiet before taking the next word, since
//! the drive ignores frames that arrive while it is still settling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hyvfd_core::error::{Error, Result};
use hyvfd_core::events::DriveEvent;
use hyvfd_core::transport::TransportWriter;

use crate::codec;
use crate::commands::{self, Command};
use crate::state::DriveState;

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Producer side of the command queue. Cloned into the poller.
#[derive(Clone)]
pub(crate) struct CommandQueue {
    tx: mpsc::Sender<String>,
    state: Arc<DriveState>,
}

impl CommandQueue {
    /// Create a queue holding at most `capacity` words.
    pub(crate) fn new(capacity: usize, state: Arc<DriveState>) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (CommandQueue { tx, state }, rx)
    }

    /// Enqueue every word in `text`.
    ///
    /// Words are accepted or dropped one at a time, so a partially accepted
    /// line leaves its leading words queued. Returns `false` if any word was
    /// dropped.
    pub(crate) fn submit(&self, text: &str) -> bool {
        let mut accepted = true;
        for word in commands::split_words(text) {
            if let Err(e) = self.push(word) {
                debug!(error = %e, "command word dropped");
                accepted = false;
            }
        }
        accepted
    }

    fn push(&self, word: String) -> Result<()> {
        self.state.pending_added();
        match self.tx.try_send(word) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.state.pending_removed();
                Err(Error::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.state.pending_removed();
                Err(Error::NotConnected)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher task
// ---------------------------------------------------------------------------

/// Configuration for the dispatcher task.
pub(crate) struct DispatcherConfig {
    /// Conversion factor for `S<rpm>` words.
    pub hertz_per_rpm: f64,
    /// Minimum silence after each frame before the next one is written.
    pub quiet_period: Duration,
}

/// Drain the queue until cancelled or the transport fails.
///
/// Returns the writer so the owner can close it once every task has stopped.
pub(crate) async fn dispatch_loop(
    mut writer: Box<dyn TransportWriter>,
    mut queue: mpsc::Receiver<String>,
    state: Arc<DriveState>,
    config: DispatcherConfig,
    event_tx: broadcast::Sender<DriveEvent>,
    cancel: CancellationToken,
) -> Box<dyn TransportWriter> {
    loop {
        let word = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("dispatcher cancelled");
                break;
            }

            word = queue.recv() => match word {
                Some(word) => word,
                None => {
                    debug!("all command senders dropped, exiting dispatcher");
                    break;
                }
            },
        };
        state.pending_removed();

        let command = match word.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "skipping unrecognized command word");
                continue;
            }
        };

        let frame = codec::encode_command(command, config.hertz_per_rpm);
        if let Command::SetSpeed { rpm } = command {
            let frequency = commands::rpm_to_frequency(rpm, config.hertz_per_rpm);
            state.set_commanded_frequency(frequency);
            debug!(rpm, frequency, "speed commanded");
        }

        if let Err(e) = writer.send(&frame).await {
            tracing::error!(error = %e, ?command, "failed to write frame, stopping dispatcher");
            state.mark_link_lost();
            let _ = event_tx.send(DriveEvent::Disconnected);
            break;
        }
        tracing::trace!(?command, data = ?frame, "frame written");

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("dispatcher cancelled during quiet period");
                break;
            }

            _ = tokio::time::sleep(config.quiet_period) => {}
        }
    }

    // Words still queued will never be sent; release their pending slots.
    queue.close();
    while queue.try_recv().is_ok() {
        state.pending_removed();
    }

    writer
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
