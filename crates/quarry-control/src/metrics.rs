//! Control-plane counters: calls, time, errors, timeouts, pending depth.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct ControlMetrics {
    total_calls: AtomicU64,
    total_time_us: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMetricsSnapshot {
    pub total_calls: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub rejected: u64,
    pub pending_depth: usize,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}

impl ControlMetrics {
    pub fn record_success(&self, elapsed_us: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn record_error(&self, elapsed_us: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self, elapsed_us: u64) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Backpressure rejections never reach the channel; counted apart.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending_depth: usize) -> ControlMetricsSnapshot {
        let total = self.total_calls.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);
        ControlMetricsSnapshot {
            total_calls: total,
            errors,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            pending_depth,
            avg_latency_ms: if total == 0 {
                0.0
            } else {
                total_us as f64 / total as f64 / 1000.0
            },
            success_rate: if total == 0 {
                1.0
            } else {
                (total - errors) as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_derives_rates() {
        let metrics = ControlMetrics::default();
        metrics.record_success(1_000);
        metrics.record_success(3_000);
        metrics.record_timeout(2_000);

        let snap = metrics.snapshot(4);
        assert_eq!(snap.total_calls, 3);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.pending_depth, 4);
        assert!((snap.avg_latency_ms - 2.0).abs() < 1e-9);
        assert!((snap.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_metrics_report_full_success() {
        let snap = ControlMetrics::default().snapshot(0);
        assert_eq!(snap.success_rate, 1.0);
        assert_eq!(snap.avg_latency_ms, 0.0);
    }
}
