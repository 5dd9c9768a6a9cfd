//! Progress accounting
//!
//! Tracks resources completed against the total the listing reported, and
//! logs a line whenever another ten percent is done. Resources that yield
//! no rows, and resources that fail terminally, still advance the counter
//! so it converges on the total.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Thread-safe completion counter for one export job
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    last_decile: AtomicUsize,
}

impl Progress {
    /// Fresh counter with no known total
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected resource total, as reported by the listing
    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Count `n` resources as done
    pub fn record_completed(&self, n: usize) {
        let done = self.completed.fetch_add(n, Ordering::Relaxed) + n;
        self.maybe_log(done);
    }

    /// Count `n` resources as terminally failed; they also count as done
    pub fn record_failed(&self, n: usize) {
        self.failed.fetch_add(n, Ordering::Relaxed);
        self.record_completed(n);
    }

    /// Expected resource total
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Resources processed so far, failures included
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Resources that failed terminally
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    fn maybe_log(&self, done: usize) {
        let total = self.total();
        if total == 0 {
            return;
        }
        let percent = (done * 100 / total).min(100);
        let decile = percent / 10;
        let previous = self.last_decile.fetch_max(decile, Ordering::Relaxed);
        if decile > previous {
            info!(percent, done, total, "progress");
        }
    }
}
