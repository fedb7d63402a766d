//! The `Drive` handle: lifecycle of the background tasks plus the query
//! surface.
//!
//! Opening a drive splits the transport and starts three tasks sharing one
//! [`DriveState`]: the dispatcher owns the write half, the telemetry reader
//! owns the read half, and the poller only touches the command queue.
//! Closing cancels all three, joins them to get the transport halves back,
//! and then closes the transport.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hyvfd_core::error::{Error, Result};
use hyvfd_core::events::DriveEvent;
use hyvfd_core::transport::{Transport, TransportReader, TransportWriter};
use hyvfd_transport::SerialTransport;

use crate::builder::DriveConfig;
use crate::dispatcher::{self, CommandQueue, DispatcherConfig};
use crate::poller;
use crate::state::{DriveState, Processed};
use crate::telemetry::{self, TelemetryConfig};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

struct DriveTasks {
    cancel: CancellationToken,
    dispatcher: JoinHandle<Box<dyn TransportWriter>>,
    reader: JoinHandle<Box<dyn TransportReader>>,
    poller: JoinHandle<()>,
}

enum Lifecycle {
    Idle,
    Running(DriveTasks),
    Closed,
}

/// A Huanyang VFD on a serial link.
///
/// Created idle by [`DriveBuilder`](crate::DriveBuilder). All methods take
/// `&self`, so a drive can be shared behind an `Arc` between a command source
/// and a status display.
pub struct Drive {
    config: DriveConfig,
    state: Arc<DriveState>,
    event_tx: broadcast::Sender<DriveEvent>,
    queue: Mutex<Option<CommandQueue>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl Drop for Drive {
    fn drop(&mut self) {
        if let Lifecycle::Running(tasks) = self.lifecycle.get_mut() {
            tasks.cancel.cancel();
            // A task blocked in a driver call may not observe cancellation.
            tasks.dispatcher.abort();
            tasks.reader.abort();
            tasks.poller.abort();
        }
    }
}

impl Drive {
    pub(crate) fn new(config: DriveConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Drive {
            state: Arc::new(DriveState::new(config.hertz_per_rpm)),
            config,
            event_tx,
            queue: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::Idle),
        }
    }

    fn queue(&self) -> MutexGuard<'_, Option<CommandQueue>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the configured serial port and start the background tasks.
    ///
    /// Does nothing if the drive is already running. Returns
    /// [`Error::InvalidParameter`] if no port was configured,
    /// [`Error::Transport`] if the port cannot be opened, and
    /// [`Error::Closed`] once the drive has been closed.
    pub async fn open(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running(_) => return Ok(()),
            Lifecycle::Closed => return Err(Error::Closed),
            Lifecycle::Idle => {}
        }

        let port = self
            .config
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("no serial port configured".into()))?;
        let transport = SerialTransport::open_with_config(port, self.config.serial.clone()).await?;
        *lifecycle = Lifecycle::Running(self.start(Box::new(transport)));
        Ok(())
    }

    /// Start the background tasks on a caller-supplied transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `hyvfd-test-harness`) and for links other than a local serial port.
    /// If the drive is already running, `transport` is dropped unused.
    pub async fn open_with_transport(&self, transport: Box<dyn Transport>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running(_) => {
                debug!("drive already open, ignoring transport");
                Ok(())
            }
            Lifecycle::Closed => Err(Error::Closed),
            Lifecycle::Idle => {
                *lifecycle = Lifecycle::Running(self.start(transport));
                Ok(())
            }
        }
    }

    fn start(&self, transport: Box<dyn Transport>) -> DriveTasks {
        let (reader, writer) = transport.split();
        let cancel = CancellationToken::new();
        let (queue, queue_rx) = CommandQueue::new(self.config.queue_capacity, Arc::clone(&self.state));

        let dispatcher = tokio::spawn(dispatcher::dispatch_loop(
            writer,
            queue_rx,
            Arc::clone(&self.state),
            DispatcherConfig {
                hertz_per_rpm: self.config.hertz_per_rpm,
                quiet_period: self.config.quiet_period,
            },
            self.event_tx.clone(),
            cancel.clone(),
        ));
        let reader = tokio::spawn(telemetry::read_loop(
            reader,
            Arc::clone(&self.state),
            TelemetryConfig {
                silence_gap: self.config.silence_gap,
                frame_sync: self.config.frame_sync,
            },
            self.event_tx.clone(),
            cancel.clone(),
        ));
        let poller = tokio::spawn(poller::poll_loop(
            queue.clone(),
            self.config.poll_interval,
            cancel.clone(),
        ));

        *self.queue() = Some(queue);
        info!(
            port = self.config.serial_port.as_deref().unwrap_or("<custom>"),
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "drive opened"
        );
        let _ = self.event_tx.send(DriveEvent::Connected);

        DriveTasks {
            cancel,
            dispatcher,
            reader,
            poller,
        }
    }

    /// Submit G-code text, e.g. `"M3 S12000"`.
    ///
    /// Each word is queued independently without waiting. Returns `false` if
    /// any word was dropped because the queue was full, or if the drive is
    /// not open.
    pub fn command(&self, text: &str) -> bool {
        match self.queue().as_ref() {
            Some(queue) => queue.submit(text),
            None => {
                debug!(text, "command rejected, drive not open");
                false
            }
        }
    }

    /// Last verified output frequency, in the drive's raw units.
    pub fn output_frequency(&self) -> u16 {
        self.state.output_frequency()
    }

    /// Last verified output speed in RPM.
    pub fn output_rpm(&self) -> u16 {
        self.state.output_rpm()
    }

    /// Last commanded frequency, in the drive's raw units.
    pub fn set_frequency(&self) -> u16 {
        self.state.set_frequency()
    }

    /// Command words accepted but not yet taken by the dispatcher.
    pub fn pending_commands(&self) -> usize {
        self.state.pending_commands()
    }

    /// Whether the drive answered within the last two poll intervals and the
    /// link has not failed.
    pub fn online(&self) -> bool {
        self.state.online(Instant::now(), self.config.poll_interval)
    }

    /// Whether the drive has caught up with everything commanded so far.
    pub fn processed(&self) -> Processed {
        self.state.processed()
    }

    /// Subscribe to frequency changes and link events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Stop the background tasks and close the transport.
    ///
    /// Words still queued are discarded. Safe to call more than once; after
    /// the first call the drive stays closed.
    pub async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Closed);
        self.queue().take();

        let tasks = match previous {
            Lifecycle::Running(tasks) => tasks,
            Lifecycle::Idle | Lifecycle::Closed => return Ok(()),
        };

        tasks.cancel.cancel();
        if let Err(e) = tasks.poller.await {
            warn!(error = %e, "poller task failed");
        }
        let reader = match tasks.reader.await {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(error = %e, "telemetry task failed");
                None
            }
        };
        let writer = match tasks.dispatcher.await {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(error = %e, "dispatcher task failed");
                None
            }
        };

        drop(reader);
        if let Some(mut writer) = writer {
            writer.close().await?;
        }
        info!("drive closed");
        Ok(())
    }
}
