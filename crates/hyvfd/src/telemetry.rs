//! Telemetry reader: reassembles drive replies from the serial byte stream.
//!
//! The drive answers a frequency query with an 8-byte status frame, but the
//! serial port delivers it in whatever fragments the UART and OS produce.
//! [`FrameAssembler`] collects fragments into candidate frames, and the
//! reader task feeds verified readings into the shared drive state.
//!
//! Frame boundaries come from line silence: a pause longer than the silence
//! gap means the previous frame is over, so any partial bytes are stale.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hyvfd_core::error::Error;
use hyvfd_core::events::DriveEvent;
use hyvfd_core::transport::TransportReader;

use crate::codec::{self, FREQUENCY_REPLY_HEADER, FREQUENCY_REPLY_LEN};
use crate::state::DriveState;

/// Buffered bytes beyond this are discarded as line noise.
const MAX_FRAME_BUF: usize = 256;

/// How long a single receive waits before the loop re-checks cancellation.
const RECEIVE_SLICE: Duration = Duration::from_millis(100);

/// How the assembler decides where a reply starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameSync {
    /// Only a silence gap resets the buffer; a candidate is checked when
    /// exactly one reply's worth of bytes has arrived.
    #[default]
    SilenceGap,
    /// Additionally scan for the reply header, so a reply preceded by noise
    /// is still found without waiting for the line to go quiet.
    HeaderScan,
}

/// Collects received bytes and extracts verified frequency readings.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: BytesMut,
    sync: FrameSync,
}

impl FrameAssembler {
    pub fn new(sync: FrameSync) -> Self {
        FrameAssembler {
            buf: BytesMut::with_capacity(FREQUENCY_REPLY_LEN * 2),
            sync,
        }
    }

    /// Drop any partially received bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Append received bytes and return the frequency of the last complete,
    /// verified reply they finish, if any.
    pub fn push(&mut self, data: &[u8]) -> Option<u16> {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_FRAME_BUF {
            warn!(len = self.buf.len(), "frame buffer overflow, resetting");
            self.buf.clear();
            return None;
        }
        match self.sync {
            FrameSync::SilenceGap => self.check_candidate(),
            FrameSync::HeaderScan => self.scan(),
        }
    }

    fn check_candidate(&mut self) -> Option<u16> {
        if self.buf.len() != FREQUENCY_REPLY_LEN {
            return None;
        }
        match codec::decode_frequency_reply(&self.buf) {
            Ok(frequency) => {
                self.buf.clear();
                Some(frequency)
            }
            Err(e) => {
                debug!(error = %e, data = ?&self.buf[..], "discarding candidate frame");
                None
            }
        }
    }

    fn scan(&mut self) -> Option<u16> {
        let mut latest = None;
        loop {
            let start = (0..self.buf.len())
                .find(|&i| {
                    let tail = &self.buf[i..];
                    let n = tail.len().min(FREQUENCY_REPLY_HEADER.len());
                    tail[..n] == FREQUENCY_REPLY_HEADER[..n]
                })
                .unwrap_or(self.buf.len());
            if start > 0 {
                debug!(skipped = start, "discarding bytes before reply header");
                self.buf.advance(start);
            }
            if self.buf.len() < FREQUENCY_REPLY_LEN {
                break;
            }
            match codec::decode_frequency_reply(&self.buf[..FREQUENCY_REPLY_LEN]) {
                Ok(frequency) => {
                    latest = Some(frequency);
                    self.buf.advance(FREQUENCY_REPLY_LEN);
                }
                Err(e) => {
                    debug!(error = %e, "header matched but frame invalid, rescanning");
                    self.buf.advance(1);
                }
            }
        }
        latest
    }
}

/// Configuration for the telemetry reader task.
pub(crate) struct TelemetryConfig {
    /// Inter-byte silence that ends a frame.
    pub silence_gap: Duration,
    pub frame_sync: FrameSync,
}

/// Read replies until cancelled or the transport fails.
///
/// Returns the reader so the owner can drop it after the writer is closed.
pub(crate) async fn read_loop(
    mut reader: Box<dyn TransportReader>,
    state: Arc<DriveState>,
    config: TelemetryConfig,
    event_tx: broadcast::Sender<DriveEvent>,
    cancel: CancellationToken,
) -> Box<dyn TransportReader> {
    let mut assembler = FrameAssembler::new(config.frame_sync);
    let mut last_byte_at: Option<Instant> = None;
    let mut buf = [0u8; 64];

    loop {
        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("telemetry reader cancelled");
                break;
            }

            result = reader.receive(&mut buf, RECEIVE_SLICE) => result,
        };

        let n = match result {
            Ok(0) | Err(Error::Timeout) => continue,
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "receive failed, stopping telemetry reader");
                state.mark_link_lost();
                let _ = event_tx.send(DriveEvent::Disconnected);
                break;
            }
        };

        let now = Instant::now();
        if let Some(prev) = last_byte_at {
            if now.duration_since(prev) > config.silence_gap && !assembler.is_empty() {
                debug!(
                    stale = assembler.len(),
                    "silence gap elapsed, discarding partial frame"
                );
                assembler.clear();
            }
        }
        last_byte_at = Some(now);
        tracing::trace!(data = ?&buf[..n], "bytes received");

        if let Some(raw) = assembler.push(&buf[..n]) {
            debug!(raw, "output frequency");
            if let Some(rpm) = state.record_output_frequency(raw, now) {
                let _ = event_tx.send(DriveEvent::FrequencyChanged { raw, rpm });
            }
        }
    }

    reader
}
