//! Background poll task.
//!
//! Issues `FETCH_RECORDS` once right away, then on a fixed interval. Each
//! issuance advances and persists the watermark before any answer arrives.

use sitesync_core::WatermarkTracker;
use sitesync_types::{ChannelMessage, Watermark};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::channel::Channel;
use crate::clock::Clock;
use crate::store::StateStore;

/// Handle to a running poll task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
    watermark: watch::Receiver<Watermark>,
}

impl PollHandle {
    /// Stop polling. Safe to call any number of times.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// The watermark after the latest issuance.
    pub fn watermark(&self) -> Watermark {
        *self.watermark.borrow()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the poll task.
pub fn spawn_poll_task(
    channel: Arc<dyn Channel>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    mut tracker: WatermarkTracker,
    period: Duration,
) -> PollHandle {
    let (watermark_tx, watermark_rx) = watch::channel(tracker.current());

    let task = tokio::spawn(async move {
        tracing::info!(
            "Poll task started (interval: {}s, since: {})",
            period.as_secs(),
            tracker.current()
        );

        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            let now = clock.now();
            let request = tracker.issue(now);
            let _ = watermark_tx.send(now);

            if let Err(e) = store.save_watermark(now).await {
                tracing::warn!("Failed to persist watermark {}: {}", now, e);
            }

            let frame = match ChannelMessage::FetchRecords(request).to_bytes() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Failed to encode fetch request: {}", e);
                    continue;
                }
            };
            match channel.send(&frame).await {
                Ok(()) => tracing::debug!("Fetch issued, watermark now {}", now),
                Err(e) => tracing::warn!("Fetch request not sent: {}", e),
            }
        }
    });

    PollHandle {
        task,
        watermark: watermark_rx,
    }
}
