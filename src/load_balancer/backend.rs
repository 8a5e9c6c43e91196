//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server and its identity
//! - Track active connections (for Least Connections selection)
//! - Enforce max connection limits
//! - Track probe-driven health state (Unknown/Healthy/Unhealthy)
//! - Own the backend's circuit breaker behind a per-backend lock

use url::Url;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::ops::Deref;
use std::time::{Duration, Instant};
use serde::Serialize;
use crate::config::{BackendConfig, CircuitBreakerConfig};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState, CircuitTransition, Permit};

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// What a run of probes says about a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Healthy,
    Unhealthy,
    /// Threshold not reached yet; health unchanged.
    Pending,
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Human-readable name from configuration.
    pub name: String,
    /// Base URL; its string form is the backend identity.
    pub url: Url,
    /// Static weight for weighted selection.
    pub weight: u32,
    /// Maximum concurrent connections allowed.
    pub max_connections: usize,
    /// Number of currently active connections.
    pub active_connections: AtomicUsize,

    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    /// Consecutive failed probes.
    failed_probes: AtomicUsize,
    /// Consecutive passed probes.
    passed_probes: AtomicUsize,
    /// Consecutive failed dispatch attempts.
    consecutive_failures: AtomicUsize,
    /// Rolling average response time in microseconds (0 = no sample yet).
    avg_response_micros: AtomicU64,
    /// Index in registration order, refreshed when the pool is replaced.
    position: AtomicUsize,

    circuit: Mutex<CircuitBreaker>,
}

impl Backend {
    /// Create a new backend.
    pub fn new(config: &BackendConfig, circuit: &CircuitBreakerConfig) -> Result<Self, url::ParseError> {
        let url = Url::parse(&config.url)?;
        Ok(Self {
            name: config.name.clone(),
            url,
            weight: config.weight,
            max_connections: config.max_connections,
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            failed_probes: AtomicUsize::new(0),
            passed_probes: AtomicUsize::new(0),
            consecutive_failures: AtomicUsize::new(0),
            avg_response_micros: AtomicU64::new(0),
            position: AtomicUsize::new(0),
            circuit: Mutex::new(CircuitBreaker::new(circuit, Instant::now())),
        })
    }

    /// Identity string used by session mappings and logs.
    pub fn id(&self) -> &str {
        self.url.as_str()
    }

    /// Whether this backend was built from the given configuration.
    pub fn matches(&self, config: &BackendConfig) -> bool {
        Url::parse(&config.url).map(|u| u == self.url).unwrap_or(false)
            && self.weight == config.weight
            && self.max_connections == config.max_connections
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    pub(crate) fn set_position(&self, position: usize) {
        self.position.store(position, Ordering::Relaxed);
    }

    /// Get the current number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Increment active connection count.
    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connection count.
    pub fn dec_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Lock this backend's circuit breaker.
    pub fn circuit(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.circuit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit().state()
    }

    /// Eligible for selection: not marked unhealthy and the circuit admits a request.
    ///
    /// Advances an expired open period to half-open as a side effect.
    pub fn is_eligible(&self, now: Instant) -> bool {
        if !self.is_healthy() {
            return false;
        }
        let mut circuit = self.circuit();
        if let Some(transition) = circuit.poll(now) {
            log_transition(self, transition, circuit.cool_down());
        }
        circuit.is_eligible()
    }

    /// Try to claim a connection slot and circuit permission for one attempt.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BackendConnectionGuard> {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev, prev + 1, Ordering::Relaxed, Ordering::Relaxed
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }

        let permit = match self.circuit().try_acquire() {
            Some(permit) => permit,
            None => {
                self.dec_connections();
                return None;
            }
        };

        Some(BackendConnectionGuard {
            backend: self.clone(),
            permit,
            settled: false,
        })
    }

    // --- Health Logic ---

    pub fn health_state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if backend is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health_state() != HealthState::Unhealthy
    }

    /// Set the health flag, returning the previous state.
    pub(crate) fn store_health(&self, healthy: bool) -> HealthState {
        let next = if healthy { HealthState::Healthy } else { HealthState::Unhealthy };
        HealthState::from(self.state.swap(next as u8, Ordering::Relaxed))
    }

    /// Count one probe result against the hysteresis thresholds.
    pub fn observe_probe(&self, success: bool, healthy_threshold: usize, unhealthy_threshold: usize) -> ProbeVerdict {
        if success {
            self.failed_probes.store(0, Ordering::Relaxed);
            let passed = self.passed_probes.fetch_add(1, Ordering::Relaxed) + 1;
            if self.is_healthy() || passed >= healthy_threshold {
                ProbeVerdict::Healthy
            } else {
                ProbeVerdict::Pending
            }
        } else {
            self.passed_probes.store(0, Ordering::Relaxed);
            let failed = self.failed_probes.fetch_add(1, Ordering::Relaxed) + 1;
            if failed >= unhealthy_threshold {
                ProbeVerdict::Unhealthy
            } else {
                ProbeVerdict::Pending
            }
        }
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Rolling average response time, if any attempt has completed.
    pub fn avg_response_time(&self) -> Option<Duration> {
        match self.avg_response_micros.load(Ordering::Relaxed) {
            0 => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    /// Fold one dispatch outcome into the failure counter and response-time average.
    pub(crate) fn observe_outcome(&self, success: bool, latency: Duration, decay: f64) {
        if success {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }

        let sample = (latency.as_micros() as u64).max(1);
        let _ = self.avg_response_micros.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |old| {
            if old == 0 {
                Some(sample)
            } else {
                let next = old as f64 * (1.0 - decay) + sample as f64 * decay;
                Some((next as u64).max(1))
            }
        });
    }
}

pub(crate) fn log_transition(backend: &Backend, transition: CircuitTransition, cool_down: Duration) {
    crate::observability::metrics::record_circuit_transition(backend.id(), transition.to);
    match transition.to {
        CircuitState::Open => tracing::warn!(
            backend = %backend.url,
            from = %transition.from,
            cool_down = ?cool_down,
            "Circuit opened"
        ),
        _ => tracing::info!(
            backend = %backend.url,
            from = %transition.from,
            to = %transition.to,
            "Circuit state changed"
        ),
    }
}

/// A RAII guard for one dispatch attempt.
///
/// Holds an active-connection slot and the circuit permit the attempt was
/// admitted with. Dropping the guard releases the slot, and an unsettled
/// half-open trial gives its trial slot back.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    pub backend: Arc<Backend>,
    permit: Permit,
    settled: bool,
}

impl BackendConnectionGuard {
    /// Whether this attempt is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.permit.is_trial()
    }

    pub fn permit(&self) -> Permit {
        self.permit
    }

    /// Mark the attempt as having reported its outcome.
    pub(crate) fn settle(&mut self) {
        self.settled = true;
    }
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
        if !self.settled && self.permit.is_trial() {
            self.backend.circuit().release_trial(self.permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::backend;

    #[test]
    fn test_guard_releases_connection() {
        let b = backend("http://127.0.0.1:9001");
        {
            let _g1 = b.try_acquire().unwrap();
            let _g2 = b.try_acquire().unwrap();
            assert_eq!(b.connection_count(), 2);
        }
        assert_eq!(b.connection_count(), 0);
    }

    #[test]
    fn test_max_connections_enforced() {
        let mut config = BackendConfig::new("a", "http://127.0.0.1:9002");
        config.max_connections = 1;
        let b = Arc::new(Backend::new(&config, &CircuitBreakerConfig::default()).unwrap());

        let g = b.try_acquire().unwrap();
        assert!(b.try_acquire().is_none());
        drop(g);
        assert!(b.try_acquire().is_some());
    }

    #[test]
    fn test_half_open_single_trial() {
        let b = backend("http://127.0.0.1:9003");
        let now = Instant::now();
        b.circuit().force_open(now);
        b.circuit().on_probe_success(now, true);

        let guard = b.try_acquire().unwrap();
        assert!(guard.is_trial());
        assert!(!b.is_eligible(now));
        assert!(b.try_acquire().is_none());
        assert_eq!(b.connection_count(), 1);

        // Abandoned trial frees the slot.
        drop(guard);
        assert!(b.is_eligible(now));
        assert_eq!(b.connection_count(), 0);
    }

    #[test]
    fn test_probe_hysteresis() {
        let b = backend("http://127.0.0.1:9004");
        assert_eq!(b.observe_probe(false, 2, 3), ProbeVerdict::Pending);
        assert_eq!(b.observe_probe(false, 2, 3), ProbeVerdict::Pending);
        assert_eq!(b.observe_probe(false, 2, 3), ProbeVerdict::Unhealthy);
        b.store_health(false);

        assert_eq!(b.observe_probe(true, 2, 3), ProbeVerdict::Pending);
        assert_eq!(b.observe_probe(true, 2, 3), ProbeVerdict::Healthy);
    }

    #[test]
    fn test_response_time_average() {
        let b = backend("http://127.0.0.1:9005");
        assert!(b.avg_response_time().is_none());

        b.observe_outcome(true, Duration::from_millis(100), 0.5);
        assert_eq!(b.avg_response_time(), Some(Duration::from_millis(100)));

        b.observe_outcome(false, Duration::from_millis(300), 0.5);
        assert_eq!(b.avg_response_time(), Some(Duration::from_millis(200)));
        assert_eq!(b.consecutive_failures(), 1);

        b.observe_outcome(true, Duration::from_millis(200), 0.5);
        assert_eq!(b.consecutive_failures(), 0);
    }
}
