//! Backend registry.
//!
//! # Responsibilities
//! - Hold the current pool of backends in registration order
//! - Filter the eligible set (healthy, circuit not open)
//! - Apply dispatch outcomes and health verdicts to per-backend state
//! - Swap in a new backend set atomically on reconfiguration

use std::sync::Arc;
use std::time::{Duration, Instant};
use arc_swap::ArcSwap;
use crate::config::{BackendConfig, CircuitBreakerConfig};
use crate::load_balancer::backend::{log_transition, Backend, BackendConnectionGuard, HealthState};
use crate::resilience::circuit_breaker::CircuitTransition;

/// The live backend pool.
///
/// Readers load an immutable snapshot; mutation happens through each
/// backend's atomics and its own circuit lock, never a pool-wide lock.
#[derive(Debug)]
pub struct Registry {
    backends: ArcSwap<Vec<Arc<Backend>>>,
    circuit: CircuitBreakerConfig,
    latency_decay: f64,
}

impl Registry {
    /// Create a registry from configuration.
    pub fn new(configs: &[BackendConfig], circuit: CircuitBreakerConfig, latency_decay: f64) -> Self {
        let registry = Self {
            backends: ArcSwap::from_pointee(Vec::new()),
            circuit,
            latency_decay,
        };
        registry.replace_backends(configs);
        registry
    }

    /// Replace the backend set atomically.
    ///
    /// Backends whose URL, weight and connection limit are unchanged keep their
    /// live health, circuit and connection state.
    pub fn replace_backends(&self, configs: &[BackendConfig]) {
        let current = self.backends.load_full();
        let mut next = Vec::with_capacity(configs.len());

        for config in configs {
            let backend = match current.iter().find(|b| b.matches(config)) {
                Some(existing) => existing.clone(),
                None => match Backend::new(config, &self.circuit) {
                    Ok(b) => Arc::new(b),
                    Err(e) => {
                        tracing::warn!(url = %config.url, error = %e, "Invalid backend url");
                        continue;
                    }
                },
            };
            backend.set_position(next.len());
            next.push(backend);
        }

        tracing::info!(
            previous = current.len(),
            current = next.len(),
            "Backend set replaced"
        );
        self.backends.store(Arc::new(next));
    }

    /// Consistent snapshot of every registered backend.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Eligible backends in registration order.
    pub fn list_eligible(&self) -> Vec<Arc<Backend>> {
        self.list_eligible_at(Instant::now())
    }

    pub fn list_eligible_at(&self, now: Instant) -> Vec<Arc<Backend>> {
        self.backends
            .load()
            .iter()
            .filter(|b| b.is_eligible(now))
            .cloned()
            .collect()
    }

    /// Look up a backend by identity (its URL).
    pub fn find(&self, id: &str) -> Option<Arc<Backend>> {
        self.backends.load().iter().find(|b| b.id() == id).cloned()
    }

    /// Apply one dispatch outcome to the backend's counters and circuit.
    ///
    /// The guard's permit decides whether the outcome may settle a half-open
    /// circuit; only the current trial can.
    pub fn record_outcome(
        &self,
        guard: &BackendConnectionGuard,
        success: bool,
        latency: Duration,
    ) -> Option<CircuitTransition> {
        self.record_outcome_at(guard, success, latency, Instant::now())
    }

    pub fn record_outcome_at(
        &self,
        guard: &BackendConnectionGuard,
        success: bool,
        latency: Duration,
        now: Instant,
    ) -> Option<CircuitTransition> {
        let backend: &Backend = guard;
        backend.observe_outcome(success, latency, self.latency_decay);

        let permit = guard.permit();
        let mut circuit = backend.circuit();
        let transition = if success {
            circuit.on_success(permit, now)
        } else {
            circuit.on_failure(permit, now)
        };
        if let Some(t) = transition {
            log_transition(backend, t, circuit.cool_down());
        }
        transition
    }

    /// Set a backend's health flag. Only the health checker calls this.
    ///
    /// Marking a backend unhealthy opens its circuit; a healthy verdict moves an
    /// open circuit to half-open (immediately when the backend was unhealthy,
    /// otherwise once its cool-down has elapsed).
    pub fn set_health(&self, backend: &Backend, healthy: bool) -> Option<CircuitTransition> {
        self.set_health_at(backend, healthy, Instant::now())
    }

    pub fn set_health_at(&self, backend: &Backend, healthy: bool, now: Instant) -> Option<CircuitTransition> {
        let previous = backend.store_health(healthy);

        match (previous, healthy) {
            (HealthState::Unhealthy, true) => {
                tracing::info!(backend = %backend.url, "Backend restored to healthy");
            }
            (HealthState::Healthy | HealthState::Unknown, false) => {
                tracing::warn!(backend = %backend.url, "Backend marked unhealthy");
            }
            _ => {}
        }
        crate::observability::metrics::record_backend_health(backend.id(), healthy);

        let mut circuit = backend.circuit();
        let transition = if healthy {
            circuit.on_probe_success(now, previous == HealthState::Unhealthy)
        } else {
            circuit.force_open(now)
        };
        if let Some(t) = transition {
            log_transition(backend, t, circuit.cool_down());
        }
        transition
    }
}
