//! Shared drive state.
//!
//! One [`DriveState`] is shared (via `Arc`) by the telemetry reader, the
//! dispatcher, the command submission path, and the query methods on
//! [`Drive`](crate::Drive). Telemetry fields are written only by the reader
//! and sit behind a single mutex so a reading and its timestamp are always
//! observed together. The pending-command counter and link flag are atomics
//! because they are touched from both caller tasks and background tasks.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::commands::frequency_to_rpm;

/// Lower bound of the "at speed" window, relative to the set frequency.
const FREQUENCY_TOLERANCE_LOW: f64 = 0.9;

/// Upper bound of the "at speed" window, relative to the set frequency.
const FREQUENCY_TOLERANCE_HIGH: f64 = 1.1;

/// Result of [`Drive::processed`](crate::Drive::processed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processed {
    /// `frequency_ok && queue_drained`.
    pub processed: bool,
    /// Output frequency is within ±10% of the last commanded frequency.
    pub frequency_ok: bool,
    /// Every accepted command word has been taken off the queue.
    pub queue_drained: bool,
}

#[derive(Debug, Default)]
struct Telemetry {
    output_frequency_raw: u16,
    output_rpm: u16,
    last_valid_response: Option<Instant>,
}

#[derive(Debug)]
pub(crate) struct DriveState {
    hertz_per_rpm: f64,
    telemetry: Mutex<Telemetry>,
    set_frequency_raw: AtomicU16,
    pending_commands: AtomicUsize,
    link_lost: AtomicBool,
}

impl DriveState {
    pub(crate) fn new(hertz_per_rpm: f64) -> Self {
        DriveState {
            hertz_per_rpm,
            telemetry: Mutex::new(Telemetry::default()),
            set_frequency_raw: AtomicU16::new(0),
            pending_commands: AtomicUsize::new(0),
            link_lost: AtomicBool::new(false),
        }
    }

    fn telemetry(&self) -> MutexGuard<'_, Telemetry> {
        self.telemetry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a verified frequency reading received at `at`.
    ///
    /// Returns the derived RPM when the reading differs from the previous
    /// one (or is the first), `None` otherwise.
    pub(crate) fn record_output_frequency(&self, raw: u16, at: Instant) -> Option<u16> {
        let rpm = frequency_to_rpm(raw, self.hertz_per_rpm);
        let mut telemetry = self.telemetry();
        let changed =
            telemetry.last_valid_response.is_none() || telemetry.output_frequency_raw != raw;
        telemetry.output_frequency_raw = raw;
        telemetry.output_rpm = rpm;
        telemetry.last_valid_response = Some(at);
        changed.then_some(rpm)
    }

    pub(crate) fn output_frequency(&self) -> u16 {
        self.telemetry().output_frequency_raw
    }

    pub(crate) fn output_rpm(&self) -> u16 {
        self.telemetry().output_rpm
    }

    pub(crate) fn set_commanded_frequency(&self, raw: u16) {
        self.set_frequency_raw.store(raw, Ordering::Release);
    }

    pub(crate) fn set_frequency(&self) -> u16 {
        self.set_frequency_raw.load(Ordering::Acquire)
    }

    /// Reserve a pending slot before an enqueue attempt.
    pub(crate) fn pending_added(&self) {
        self.pending_commands.fetch_add(1, Ordering::AcqRel);
    }

    /// Release a pending slot, after a dequeue or a failed enqueue.
    ///
    /// Every call pairs with an earlier [`pending_added`](Self::pending_added),
    /// so the counter cannot underflow.
    pub(crate) fn pending_removed(&self) {
        self.pending_commands.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn pending_commands(&self) -> usize {
        self.pending_commands.load(Ordering::Acquire)
    }

    pub(crate) fn mark_link_lost(&self) {
        self.link_lost.store(true, Ordering::Release);
    }

    pub(crate) fn is_link_lost(&self) -> bool {
        self.link_lost.load(Ordering::Acquire)
    }

    /// A valid reply arrived less than two poll intervals before `now`, and
    /// no task has lost the link.
    pub(crate) fn online(&self, now: Instant, poll_interval: Duration) -> bool {
        if self.is_link_lost() {
            return false;
        }
        match self.telemetry().last_valid_response {
            Some(at) => now.saturating_duration_since(at) < poll_interval.saturating_mul(2),
            None => false,
        }
    }

    pub(crate) fn processed(&self) -> Processed {
        let set = f64::from(self.set_frequency());
        let output = f64::from(self.output_frequency());
        let frequency_ok =
            output >= set * FREQUENCY_TOLERANCE_LOW && output <= set * FREQUENCY_TOLERANCE_HIGH;
        let queue_drained = self.pending_commands() == 0;
        Processed {
            processed: frequency_ok && queue_drained,
            frequency_ok,
            queue_drained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HZ_PER_RPM: f64 = 3.47222;

    #[test]
    fn drive_state_default() {
        let state = DriveState::new(HZ_PER_RPM);
        assert_eq!(state.output_frequency(), 0);
        assert_eq!(state.output_rpm(), 0);
        assert_eq!(state.set_frequency(), 0);
        assert_eq!(state.pending_commands(), 0);
        assert!(!state.is_link_lost());
        assert!(!state.online(Instant::now(), Duration::from_millis(750)));
    }

    #[test]
    fn record_derives_rpm() {
        let state = DriveState::new(HZ_PER_RPM);
        let rpm = state.record_output_frequency(3472, Instant::now());
        assert_eq!(rpm, Some(1000));
        assert_eq!(state.output_frequency(), 3472);
        assert_eq!(state.output_rpm(), 1000);
    }

    #[test]
    fn record_reports_only_changes() {
        let state = DriveState::new(HZ_PER_RPM);
        let now = Instant::now();
        assert_eq!(state.record_output_frequency(0, now), Some(0));
        assert_eq!(state.record_output_frequency(0, now), None);
        assert_eq!(state.record_output_frequency(1389, now), Some(400));
    }

    #[test]
    fn online_window() {
        let state = DriveState::new(HZ_PER_RPM);
        let poll = Duration::from_millis(750);
        let at = Instant::now();
        state.record_output_frequency(100, at);

        assert!(state.online(at, poll));
        assert!(state.online(at + Duration::from_millis(1499), poll));
        assert!(!state.online(at + Duration::from_millis(1500), poll));
    }

    #[test]
    fn online_with_huge_poll_interval() {
        let state = DriveState::new(HZ_PER_RPM);
        let at = Instant::now();
        state.record_output_frequency(100, at);
        assert!(state.online(at + Duration::from_secs(3600), Duration::MAX));
    }

    #[test]
    fn link_lost_forces_offline() {
        let state = DriveState::new(HZ_PER_RPM);
        let at = Instant::now();
        state.record_output_frequency(100, at);
        state.mark_link_lost();
        assert!(!state.online(at, Duration::from_millis(750)));
    }

    #[test]
    fn pending_counter() {
        let state = DriveState::new(HZ_PER_RPM);
        state.pending_added();
        state.pending_added();
        state.pending_removed();
        assert_eq!(state.pending_commands(), 1);
    }

    #[test]
    fn processed_when_idle_at_rest() {
        let state = DriveState::new(HZ_PER_RPM);
        let p = state.processed();
        assert!(p.frequency_ok);
        assert!(p.queue_drained);
        assert!(p.processed);
    }

    #[test]
    fn processed_tolerance_window() {
        let state = DriveState::new(HZ_PER_RPM);
        state.set_commanded_frequency(1000);
        let now = Instant::now();

        for (output, ok) in [(899, false), (900, true), (1000, true), (1100, true), (1101, false)] {
            state.record_output_frequency(output, now);
            assert_eq!(state.processed().frequency_ok, ok, "output {output}");
        }
    }

    #[test]
    fn processed_requires_drained_queue() {
        let state = DriveState::new(HZ_PER_RPM);
        state.set_commanded_frequency(1000);
        state.record_output_frequency(1000, Instant::now());
        state.pending_added();

        let p = state.processed();
        assert!(p.frequency_ok);
        assert!(!p.queue_drained);
        assert!(!p.processed);

        state.pending_removed();
        assert!(state.processed().processed);
    }
}
