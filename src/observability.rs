//! Run metrics and tracing setup

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Counters shared by the workers of one run
#[derive(Debug, Default)]
pub struct RunMetrics {
    popped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    delivered: AtomicU64,
    filtered: AtomicU64,
    peak_workers: AtomicUsize,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_popped(&self) {
        self.popped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn result_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn result_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the current live worker count, keeping the maximum
    pub fn observe_workers(&self, live: usize) {
        self.peak_workers.fetch_max(live, Ordering::Relaxed);
    }

    pub fn snapshot(&self, elapsed: Duration) -> RunSummary {
        RunSummary {
            popped: self.popped.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            peak_workers: self.peak_workers.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Tasks taken off the queue
    pub popped: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Completions handed to the callback
    pub delivered: u64,
    /// Completions dropped by the result check
    pub filtered: u64,
    pub peak_workers: usize,
    pub elapsed: Duration,
}

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = RunMetrics::new();
        metrics.task_popped();
        metrics.task_popped();
        metrics.fetch_succeeded();
        metrics.fetch_failed();
        metrics.result_delivered();
        metrics.result_filtered();
        metrics.observe_workers(3);
        metrics.observe_workers(1);

        let summary = metrics.snapshot(Duration::from_millis(5));
        assert_eq!(summary.popped, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.peak_workers, 3);
        assert_eq!(summary.elapsed, Duration::from_millis(5));
    }
}
