use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of [`ServiceMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceMetricsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub diagnosed: u64,
    pub failed: u64,
    pub results: u64,
}

impl ServiceMetricsSnapshot {
    /// Requests that left the queue, successfully or not
    pub fn completed(&self) -> u64 {
        self.diagnosed + self.failed
    }
}

/// Lock-free counters shared by the admission side and every worker
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    diagnosed: AtomicU64,
    failed: AtomicU64,
    results: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_diagnosed(&self, occurrences: usize) {
        self.diagnosed.fetch_add(1, Ordering::Relaxed);
        self.results.fetch_add(occurrences as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            diagnosed: self.diagnosed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            results: self.results.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = ServiceMetrics::new();
        metrics.record_accepted();
        metrics.record_accepted();
        metrics.record_rejected();
        metrics.record_diagnosed(3);
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.results, 3);
        assert_eq!(snapshot.completed(), 2);
    }
}
