//! The engine value.
//!
//! One `Engine` is built at process start and shared by handle (`Arc<Engine>`)
//! with the ingress, the admin API and the background tasks. Nothing in the
//! crate reaches it through a global.

use std::sync::Arc;
use arc_swap::ArcSwap;
use serde::Serialize;
use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::{Algorithm, BackoffKind, EngineConfig};
use crate::health::{report, HealthMonitor, HealthReport, ProbeSummary};
use crate::load_balancer::registry::Registry;
use crate::load_balancer::{from_algorithm, LoadBalancer};
use crate::observability::{StatsCollector, StatsSnapshot};
use crate::resilience::RetryPolicy;
use crate::session::{SessionAffinity, SessionSummary};
use crate::upstream::{HttpUpstream, Upstream};

pub struct Engine {
    pub(crate) config: ArcSwap<EngineConfig>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) balancer: Box<dyn LoadBalancer>,
    pub(crate) sessions: Arc<SessionAffinity>,
    pub(crate) stats: Arc<StatsCollector>,
    pub(crate) upstream: Arc<dyn Upstream>,
    pub(crate) health: Arc<HealthMonitor>,
    pub(crate) retry: RetryPolicy,
}

/// Wire shape of the stats query.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub algorithm: Algorithm,
    pub eligible_backends: usize,
    pub total_backends: usize,
    pub session_affinity: SessionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub url: String,
    pub weight: u32,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSummary {
    pub failure_threshold: u32,
    pub window_secs: u64,
    pub open_secs: u64,
    pub backoff_multiplier: f64,
    pub max_open_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrySummary {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

/// Wire shape of the config query.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub algorithm: Algorithm,
    pub backends: Vec<BackendSummary>,
    pub health_check_interval_secs: u64,
    pub circuit_breaker: CircuitSummary,
    pub retries: RetrySummary,
    pub session_affinity_enabled: bool,
    pub session_ttl_secs: u64,
}

impl Engine {
    /// Validate `config` and build an engine talking HTTP to its backends.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_upstream(config, Arc::new(HttpUpstream::new()))
    }

    /// Build an engine over a caller-supplied transport.
    pub fn with_upstream(config: EngineConfig, upstream: Arc<dyn Upstream>) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let registry = Arc::new(Registry::new(
            &config.backends,
            config.circuit_breaker.clone(),
            config.stats.latency_decay,
        ));
        let stats = Arc::new(StatsCollector::new(config.stats.latency_decay));
        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            upstream.clone(),
            stats.clone(),
            config.health_check.clone(),
        ));

        tracing::info!(
            algorithm = %config.algorithm,
            backends = registry.len(),
            max_attempts = config.retries.max_attempts,
            session_affinity = config.session_affinity.enabled,
            "Engine initialized"
        );

        Ok(Self {
            balancer: from_algorithm(config.algorithm),
            sessions: Arc::new(SessionAffinity::new(config.session_affinity.clone())),
            retry: RetryPolicy::from_config(&config.retries),
            config: ArcSwap::from_pointee(config),
            registry,
            stats,
            upstream,
            health,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionAffinity> {
        &self.sessions
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn stats_collector(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn algorithm(&self) -> Algorithm {
        self.balancer.algorithm()
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }

    pub fn stats(&self) -> StatsReport {
        StatsReport {
            counters: self.stats.snapshot(),
            algorithm: self.algorithm(),
            eligible_backends: self.registry.list_eligible().len(),
            total_backends: self.registry.len(),
            session_affinity: self.sessions.summary(),
        }
    }

    pub fn health(&self) -> HealthReport {
        report::report(&self.registry)
    }

    /// Run one probe cycle now, outside the timer.
    pub async fn check_health(&self) -> ProbeSummary {
        tracing::info!("Manual health check triggered");
        self.health.check_all().await
    }

    pub fn config_report(&self) -> ConfigReport {
        let config = self.config.load();
        let cb = &config.circuit_breaker;
        let retries = &config.retries;
        ConfigReport {
            algorithm: self.algorithm(),
            backends: self
                .registry
                .snapshot()
                .iter()
                .map(|b| BackendSummary {
                    name: b.name.clone(),
                    url: b.id().to_string(),
                    weight: b.weight,
                    max_connections: b.max_connections,
                })
                .collect(),
            health_check_interval_secs: config.health_check.interval_secs,
            circuit_breaker: CircuitSummary {
                failure_threshold: cb.failure_threshold,
                window_secs: cb.window_secs,
                open_secs: cb.open_secs,
                backoff_multiplier: cb.backoff_multiplier,
                max_open_secs: cb.max_open_secs,
            },
            retries: RetrySummary {
                max_attempts: retries.max_attempts,
                backoff: retries.backoff,
                base_delay_ms: retries.base_delay_ms,
                max_delay_ms: retries.max_delay_ms,
                attempt_timeout_ms: retries.attempt_timeout_ms,
            },
            session_affinity_enabled: config.session_affinity.enabled,
            session_ttl_secs: config.session_affinity.ttl_secs,
        }
    }

    /// Drop every sticky-session mapping.
    pub fn clear_sessions(&self) -> usize {
        self.sessions.clear_all()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Apply a reloaded configuration.
    ///
    /// Only the backend set is swapped; every other section keeps the values
    /// the engine was built with.
    pub fn reload(&self, next: EngineConfig) -> Result<(), ConfigError> {
        validate_config(&next).map_err(ConfigError::Validation)?;

        if next.algorithm != self.algorithm() {
            tracing::warn!(
                current = %self.algorithm(),
                requested = %next.algorithm,
                "Algorithm change ignored; restart to apply"
            );
        }

        self.registry.replace_backends(&next.backends);

        let mut applied = (*self.config.load_full()).clone();
        applied.backends = next.backends;
        self.config.store(Arc::new(applied));
        Ok(())
    }
}
