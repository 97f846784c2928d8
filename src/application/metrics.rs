//! Lifetime counters for limiter decisions.
//!
//! Counters only grow (until [`Metrics::reset`]) and are independent of the
//! bucket state, so they survive eviction of the buckets that produced them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic decision counters shared by every clone of a limiter.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    allowed: AtomicU64,
    rejected: AtomicU64,
    circuit_rejections: AtomicU64,
    unmatched: AtomicU64,
    evicted: AtomicU64,
}

impl Metrics {
    /// Create a zeroed tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_circuit_rejection(&self) {
        self.inner.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unmatched(&self) {
        self.inner.unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        self.inner
            .evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Requests admitted by a bucket.
    pub fn allowed(&self) -> u64 {
        self.inner.allowed.load(Ordering::Relaxed)
    }

    /// Requests rejected by a bucket.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Requests rejected by an open circuit.
    pub fn circuit_rejections(&self) -> u64 {
        self.inner.circuit_rejections.load(Ordering::Relaxed)
    }

    /// Requests no rule matched.
    pub fn unmatched(&self) -> u64 {
        self.inner.unmatched.load(Ordering::Relaxed)
    }

    /// Buckets and breakers removed by idle sweeps or the capacity cap.
    pub fn evicted(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed(),
            rejected: self.rejected(),
            circuit_rejections: self.circuit_rejections(),
            unmatched: self.unmatched(),
            evicted: self.evicted(),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.inner.allowed.store(0, Ordering::Relaxed);
        self.inner.rejected.store(0, Ordering::Relaxed);
        self.inner.circuit_rejections.store(0, Ordering::Relaxed);
        self.inner.unmatched.store(0, Ordering::Relaxed);
        self.inner.evicted.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Requests admitted by a bucket
    pub allowed: u64,
    /// Requests rejected by a bucket
    pub rejected: u64,
    /// Requests rejected by an open circuit
    pub circuit_rejections: u64,
    /// Requests no rule matched
    pub unmatched: u64,
    /// Buckets and breakers evicted
    pub evicted: u64,
}

impl MetricsSnapshot {
    /// Requests that reached a decision, matched or not.
    pub fn total_requests(&self) -> u64 {
        self.allowed
            .saturating_add(self.rejected)
            .saturating_add(self.circuit_rejections)
            .saturating_add(self.unmatched)
    }

    /// Share of matched requests that were rejected, by bucket or circuit.
    ///
    /// Returns 0.0 if no matched requests have been processed.
    pub fn rejection_rate(&self) -> f64 {
        let rejected = self.rejected.saturating_add(self.circuit_rejections);
        let total = self.allowed.saturating_add(rejected);
        if total == 0 {
            0.0
        } else {
            rejected as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert_eq!(metrics.snapshot().rejection_rate(), 0.0);
    }

    #[test]
    fn test_rates() {
        let metrics = Metrics::new();
        metrics.record_allowed();
        metrics.record_allowed();
        metrics.record_rejected();
        metrics.record_circuit_rejection();
        metrics.record_unmatched();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests(), 5);
        assert!((snapshot.rejection_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_evictions(3);
        assert_eq!(metrics.evicted(), 3);

        metrics.reset();
        assert_eq!(clone.evicted(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Metrics::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_allowed();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.allowed(), 8000);
    }
}
