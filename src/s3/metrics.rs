//! Metrics collection for object transfers.
//!
//! This module provides thread-safe tracking of upload metrics including
//! bytes transferred, object count, failures and timing information.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Collector for transfer metrics.
///
/// Shared between concurrently running upload tasks; every counter is
/// updated atomically. Counters are cumulative over the collector's life.
#[derive(Debug, Default)]
pub struct TransferMetrics {
    /// Total bytes transferred
    total_bytes: AtomicU64,
    /// Number of objects written
    object_count: AtomicUsize,
    /// Number of failed transfers
    failure_count: AtomicUsize,
    /// Total time spent in transfers (nanoseconds)
    total_transfer_time_ns: AtomicU64,
    /// Start time of the operation
    operation_start: RwLock<Option<Instant>>,
}

impl TransferMetrics {
    /// Create a new metrics collector wrapped in Arc for sharing
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start timing an operation
    pub fn start_operation(&self) {
        if let Ok(mut start) = self.operation_start.write() {
            *start = Some(Instant::now());
        }
    }

    /// Record a completed transfer
    pub fn record_transfer(&self, bytes: u64, duration: Duration) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.object_count.fetch_add(1, Ordering::Relaxed);
        self.total_transfer_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a failed transfer
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn object_count(&self) -> usize {
        self.object_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Get total transfer time summed over all transfers
    pub fn total_transfer_time(&self) -> Duration {
        Duration::from_nanos(self.total_transfer_time_ns.load(Ordering::Relaxed))
    }

    /// Get elapsed time since operation start
    pub fn operation_elapsed(&self) -> Option<Duration> {
        self.operation_start
            .read()
            .ok()
            .and_then(|start| start.map(|s| s.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_tracking() {
        let metrics = TransferMetrics::new();

        metrics.record_transfer(1000, Duration::from_millis(50));
        metrics.record_transfer(2000, Duration::from_millis(100));
        metrics.record_failure();

        assert_eq!(metrics.total_bytes(), 3000);
        assert_eq!(metrics.object_count(), 2);
        assert_eq!(metrics.failure_count(), 1);
        assert_eq!(metrics.total_transfer_time(), Duration::from_millis(150));
    }

    #[test]
    fn test_operation_timing() {
        let metrics = TransferMetrics::new();

        assert!(metrics.operation_elapsed().is_none());

        metrics.start_operation();
        std::thread::sleep(Duration::from_millis(10));

        let elapsed = metrics.operation_elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = TransferMetrics::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    metrics.record_transfer(10, Duration::from_millis(1));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.object_count(), 8);
        assert_eq!(metrics.total_bytes(), 80);
    }
}
