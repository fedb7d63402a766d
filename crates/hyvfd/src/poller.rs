//! Periodic output-frequency polling.
//!
//! The poller owns no transport access. It submits a `?` word through the
//! shared command queue, so queries interleave with user commands and obey
//! the same ordering and quiet-period rules.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatcher::CommandQueue;

/// Submit a frequency query every `interval` until cancelled.
///
/// The first query goes out one interval after start. A query that finds
/// the queue full is skipped; the next tick tries again.
pub(crate) async fn poll_loop(queue: CommandQueue, interval: Duration, cancel: CancellationToken) {
    let now = Instant::now();
    let start = now.checked_add(interval).unwrap_or(now);
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("poller cancelled");
                break;
            }

            _ = ticker.tick() => {
                if !queue.submit("?") {
                    trace!("frequency query skipped, queue unavailable");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::state::DriveState;

    #[tokio::test(start_paused = true)]
    async fn poller_submits_queries_each_interval() {
        let state = Arc::new(DriveState::new(3.47222));
        let (queue, mut rx) = CommandQueue::new(10, Arc::clone(&state));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(queue, Duration::from_millis(750), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(rx.try_recv().unwrap(), "?");
        assert_eq!(rx.try_recv().unwrap(), "?");
        assert_eq!(rx.try_recv().unwrap(), "?");
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn poller_skips_when_queue_full() {
        let state = Arc::new(DriveState::new(3.47222));
        let (queue, _rx) = CommandQueue::new(2, Arc::clone(&state));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(queue, Duration::from_millis(100), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert_eq!(state.pending_commands(), 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
