//! Wall-clock source for watermarks.

use sitesync_types::Watermark;
use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies "now" as a watermark.
pub trait Clock: Send + Sync {
    /// Current time in Unix seconds.
    fn now(&self) -> Watermark;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Watermark {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Watermark::new(secs)
    }
}
