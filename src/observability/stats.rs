//! Aggregate dispatch statistics.
//!
//! Counters are independent atomics; a snapshot may mix values from slightly
//! different instants but never blocks a writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use serde::Serialize;

#[derive(Debug)]
pub struct StatsCollector {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    retried_requests: AtomicU64,
    attempts: AtomicU64,
    circuit_trips: AtomicU64,
    /// EWMA latency in milliseconds, stored as `f64` bits.
    avg_latency_ms: AtomicU64,
    decay: f64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub attempts: u64,
    pub circuit_trips: u64,
    pub avg_response_time_ms: f64,
}

impl StatsCollector {
    /// `decay` is the EWMA weight given to each new latency sample.
    pub fn new(decay: f64) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            retried_requests: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            circuit_trips: AtomicU64::new(0),
            avg_latency_ms: AtomicU64::new(0f64.to_bits()),
            decay: decay.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    /// Count one finished logical request.
    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a logical request that needed at least one retry.
    pub fn record_retry(&self) {
        self.retried_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trip(&self) {
        self.circuit_trips.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one attempt and fold its latency into the average.
    pub fn record_attempt(&self, latency: Duration) {
        let first = self.attempts.fetch_add(1, Ordering::Relaxed) == 0;
        let sample = latency.as_secs_f64() * 1000.0;
        let decay = self.decay;
        let _ = self.avg_latency_ms.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            let old = f64::from_bits(bits);
            let next = if first || old == 0.0 {
                sample
            } else {
                old * (1.0 - decay) + sample * decay
            };
            Some(next.to_bits())
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            retried_requests: self.retried_requests.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            circuit_trips: self.circuit_trips.load(Ordering::Relaxed),
            avg_response_time_ms: f64::from_bits(self.avg_latency_ms.load(Ordering::Relaxed)),
        }
    }

    /// Administrative reset of every counter.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.retried_requests.store(0, Ordering::Relaxed);
        self.attempts.store(0, Ordering::Relaxed);
        self.circuit_trips.store(0, Ordering::Relaxed);
        self.avg_latency_ms.store(0f64.to_bits(), Ordering::Relaxed);
        tracing::info!("Stats reset");
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let stats = StatsCollector::default();
        stats.record_request(true);
        stats.record_request(false);
        stats.record_retry();
        stats.record_trip();

        let s = stats.snapshot();
        assert_eq!(s.total_requests, 2);
        assert_eq!(s.successful_requests, 1);
        assert_eq!(s.failed_requests, 1);
        assert_eq!(s.retried_requests, 1);
        assert_eq!(s.circuit_trips, 1);
    }

    #[test]
    fn test_latency_ewma() {
        let stats = StatsCollector::new(0.5);
        stats.record_attempt(Duration::from_millis(100));
        assert!((stats.snapshot().avg_response_time_ms - 100.0).abs() < 1e-6);

        stats.record_attempt(Duration::from_millis(300));
        assert!((stats.snapshot().avg_response_time_ms - 200.0).abs() < 1e-6);
        assert_eq!(stats.snapshot().attempts, 2);
    }

    #[test]
    fn test_reset() {
        let stats = StatsCollector::default();
        stats.record_request(true);
        stats.record_attempt(Duration::from_millis(10));
        stats.reset();
        let s = stats.snapshot();
        assert_eq!(s.total_requests, 0);
        assert_eq!(s.attempts, 0);
        assert_eq!(s.avg_response_time_ms, 0.0);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let stats = Arc::new(StatsCollector::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    stats.record_request(true);
                    stats.record_attempt(Duration::from_millis(1));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let s = stats.snapshot();
        assert_eq!(s.total_requests, 8000);
        assert_eq!(s.attempts, 8000);
    }
}
