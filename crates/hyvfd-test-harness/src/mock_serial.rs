//! Mock transport for deterministic testing of the drive protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait without hardware.
//! Frames written by the engine are recorded with the instant they were sent;
//! configured request frames are answered with canned responses, and tests
//! can push arbitrary inbound bytes to exercise frame reassembly.
//!
//! Because the engine splits the transport and moves both halves into
//! background tasks, tests keep a [`MockHandle`] to observe and drive the
//! mock after it has been handed over.
//!
//! # Example
//!
//! ```
//! use hyvfd_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Answer a frequency query with 3472 (0x0D90).
//! mock.reply_to(&[0x01, 0x04, 0x03, 0x01, 0x00, 0x00, 0xA1, 0x8E],
//!               &[0x01, 0x04, 0x03, 0x01, 0x0D, 0x90, 0xA5, 0x72]);
//! let handle = mock.handle();
//! assert!(handle.sent_data().is_empty());
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use hyvfd_core::error::{Error, Result};
use hyvfd_core::transport::{Transport, TransportReader, TransportWriter};

/// Computes the reply, if any, to a frame written by the engine.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A frame written through the mock, with its send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// When `send()` was called (tokio clock, so paused-time tests see virtual time).
    pub at: Instant,
    /// The bytes written.
    pub data: Vec<u8>,
}

/// A canned request/response pair. Unlike a one-shot expectation, a reply
/// is reused every time its request is seen, since the engine polls.
#[derive(Debug, Clone)]
struct Reply {
    request: Vec<u8>,
    response: Vec<u8>,
}

struct MockState {
    replies: Vec<Reply>,
    responder: Option<Responder>,
    sent_log: Vec<SentFrame>,
    connected: bool,
    closed: bool,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock [`Transport`] for testing the drive engine without hardware.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                replies: Vec::new(),
                responder: None,
                sent_log: Vec::new(),
                connected: true,
                closed: false,
            })),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Answer every `send()` of exactly `request` with `response`.
    ///
    /// The response becomes readable immediately, as a single chunk.
    pub fn reply_to(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.state).replies.push(Reply {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Compute replies with a closure, for stateful simulations.
    ///
    /// The responder is consulted for frames that match no [`reply_to`](Self::reply_to) pair.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        lock(&self.state).responder = Some(Box::new(responder));
        self
    }

    /// Return a handle that stays usable after the transport is split.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
            inbound_tx: self.inbound_tx.clone(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let MockTransport {
            state,
            inbound_tx,
            inbound_rx,
        } = *self;
        let reader = MockReader {
            state: Arc::clone(&state),
            inbound_rx,
            pending: Vec::new(),
        };
        let writer = MockWriter { state, inbound_tx };
        (Box::new(reader), Box::new(writer))
    }
}

/// Observes and drives a [`MockTransport`] from test code.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockHandle {
    /// All frames sent so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state)
            .sent_log
            .iter()
            .map(|frame| frame.data.clone())
            .collect()
    }

    /// All frames sent so far, with their send instants.
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        lock(&self.state).sent_log.clone()
    }

    /// Forget previously sent frames.
    pub fn clear_sent(&self) {
        lock(&self.state).sent_log.clear();
    }

    /// Make `bytes` available to the next `receive()` as one chunk.
    pub fn inject(&self, bytes: &[u8]) {
        let _ = self.inbound_tx.send(bytes.to_vec());
    }

    /// Set the connected state.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls return
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    /// Whether the engine has closed the transport.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

struct MockReader {
    state: Arc<Mutex<MockState>>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Bytes of a chunk that did not fit into the caller's buffer.
    pending: Vec<u8>,
}

#[async_trait]
impl TransportReader for MockReader {
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !lock(&self.state).connected {
            return Err(Error::NotConnected);
        }

        if self.pending.is_empty() {
            match tokio::time::timeout(timeout, self.inbound_rx.recv()).await {
                Ok(Some(chunk)) => self.pending = chunk,
                Ok(None) => return Err(Error::ConnectionLost),
                Err(_) => return Err(Error::Timeout),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct MockWriter {
    state: Arc<Mutex<MockState>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl TransportWriter for MockWriter {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let response = {
            let mut state = lock(&self.state);
            if !state.connected || state.closed {
                return Err(Error::NotConnected);
            }

            state.sent_log.push(SentFrame {
                at: Instant::now(),
                data: data.to_vec(),
            });

            let canned = state
                .replies
                .iter()
                .find(|reply| reply.request == data)
                .map(|reply| reply.response.clone());
            match canned {
                Some(response) => Some(response),
                None => state.responder.as_mut().and_then(|respond| respond(data)),
            }
        };

        if let Some(response) = response {
            let _ = self.inbound_tx.send(response);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.closed = true;
        state.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(mock: MockTransport) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        Box::new(mock).split()
    }

    #[tokio::test]
    async fn mock_transport_reply_is_readable() {
        let mut mock = MockTransport::new();
        let request = &[0x01, 0x04, 0x03, 0x01, 0x00, 0x00];
        let response = &[0x01, 0x04, 0x03, 0x01, 0x12, 0x34, 0xAA, 0xBB];
        mock.reply_to(request, response);
        let (mut reader, mut writer) = split(mock);

        writer.send(request).await.unwrap();

        let mut buf = [0u8; 16];
        let n = reader
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], response);
    }

    #[tokio::test]
    async fn mock_transport_reply_repeats() {
        let mut mock = MockTransport::new();
        mock.reply_to(&[0x01], &[0xFF]);
        let (mut reader, mut writer) = split(mock);

        let mut buf = [0u8; 4];
        for _ in 0..3 {
            writer.send(&[0x01]).await.unwrap();
            let n = reader
                .receive(&mut buf, Duration::from_millis(100))
                .await
                .unwrap();
            assert_eq!(&buf[..n], &[0xFF]);
        }
    }

    #[tokio::test]
    async fn mock_transport_tracks_sent_data() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (_reader, mut writer) = split(mock);

        writer.send(&[0x01, 0x02]).await.unwrap();
        writer.send(&[0x03, 0x04]).await.unwrap();

        assert_eq!(handle.sent_data(), vec![vec![0x01, 0x02], vec![0x03, 0x04]]);
        assert_eq!(handle.sent_frames().len(), 2);

        handle.clear_sent();
        assert!(handle.sent_data().is_empty());
    }

    #[tokio::test]
    async fn mock_transport_responder_handles_unmatched_frames() {
        let mock = MockTransport::new().with_responder(|frame| Some(frame.iter().rev().copied().collect()));
        let (mut reader, mut writer) = split(mock);

        writer.send(&[0x01, 0x02, 0x03]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = reader
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0x03, 0x02, 0x01]);
    }

    #[tokio::test]
    async fn mock_transport_receive_without_data_times_out() {
        let mock = MockTransport::new();
        let (mut reader, _writer) = split(mock);
        let mut buf = [0u8; 8];

        let result = reader.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_transport_partial_receive() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (mut reader, _writer) = split(mock);
        handle.inject(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut buf = [0u8; 2];
        let n = reader
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);

        let n = reader
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn mock_transport_set_connected() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (mut reader, mut writer) = split(mock);
        handle.set_connected(false);

        let result = writer.send(&[0x01]).await;
        assert!(matches!(result, Err(Error::NotConnected)));

        let mut buf = [0u8; 8];
        let result = reader.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn mock_transport_close() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (_reader, mut writer) = split(mock);

        writer.close().await.unwrap();
        assert!(handle.is_closed());

        let result = writer.send(&[0x01]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
