//! Health report for the admin surface.

use serde::Serialize;
use std::time::Instant;
use crate::load_balancer::backend::{Backend, HealthState};
use crate::load_balancer::registry::Registry;
use crate::resilience::circuit_breaker::CircuitState;

/// Overall status derived from the fraction of eligible backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_counts(eligible: usize, total: usize) -> Self {
        if total > 0 && eligible == total {
            HealthStatus::Healthy
        } else if eligible == 0 {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendDetail {
    pub name: String,
    pub url: String,
    pub weight: u32,
    pub healthy: bool,
    pub health: HealthState,
    pub circuit_state: CircuitState,
    pub eligible: bool,
    pub active_connections: usize,
    pub max_connections: usize,
    pub consecutive_failures: usize,
    pub avg_response_time_ms: Option<f64>,
}

impl BackendDetail {
    fn from_backend(backend: &Backend, eligible: bool) -> Self {
        Self {
            name: backend.name.clone(),
            url: backend.id().to_string(),
            weight: backend.weight,
            healthy: backend.is_healthy(),
            health: backend.health_state(),
            circuit_state: backend.circuit_state(),
            eligible,
            active_connections: backend.connection_count(),
            max_connections: backend.max_connections,
            consecutive_failures: backend.consecutive_failures(),
            avg_response_time_ms: backend.avg_response_time().map(|d| d.as_secs_f64() * 1000.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub eligible_backends: usize,
    pub total_backends: usize,
    pub backends: Vec<BackendDetail>,
}

/// Build a report from the registry's current snapshot.
pub fn report(registry: &Registry) -> HealthReport {
    let now = Instant::now();
    let backends: Vec<BackendDetail> = registry
        .snapshot()
        .iter()
        .map(|b| BackendDetail::from_backend(b, b.is_eligible(now)))
        .collect();
    let eligible = backends.iter().filter(|b| b.eligible).count();

    HealthReport {
        status: HealthStatus::from_counts(eligible, backends.len()),
        eligible_backends: eligible,
        total_backends: backends.len(),
        backends,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, CircuitBreakerConfig};

    #[test]
    fn test_status_from_counts() {
        assert_eq!(HealthStatus::from_counts(3, 3), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(1, 3), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(0, 3), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(0, 0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_report_reflects_unhealthy_backend() {
        let configs = vec![
            BackendConfig::new("a", "http://127.0.0.1:7100"),
            BackendConfig::new("b", "http://127.0.0.1:7101").with_weight(2),
        ];
        let registry = Registry::new(&configs, CircuitBreakerConfig::default(), 0.2);
        let b = registry.snapshot()[0].clone();
        registry.set_health(&b, false);

        let report = report(&registry);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.eligible_backends, 1);
        assert_eq!(report.total_backends, 2);
        assert!(!report.backends[0].healthy);
        assert_eq!(report.backends[0].circuit_state, CircuitState::Open);
        assert_eq!(report.backends[1].weight, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["backends"][0]["circuit_state"], "open");
    }
}
