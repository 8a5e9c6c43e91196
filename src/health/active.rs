//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe backends
//! - Update backend health state based on results
//! - Keep one slow backend from delaying the others

use std::sync::Arc;
use std::time::{Duration, Instant};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time;
use tokio::sync::broadcast;
use crate::config::HealthCheckConfig;
use crate::load_balancer::backend::{Backend, ProbeVerdict};
use crate::load_balancer::registry::Registry;
use crate::observability::StatsCollector;
use crate::upstream::Upstream;

/// Outcome of one probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub probed: usize,
    pub passed: usize,
    pub failed: usize,
    /// Backends considered healthy after the cycle.
    pub healthy: usize,
    pub unhealthy: usize,
}

pub struct HealthMonitor {
    registry: Arc<Registry>,
    upstream: Arc<dyn Upstream>,
    stats: Arc<StatsCollector>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<Registry>,
        upstream: Arc<dyn Upstream>,
        stats: Arc<StatsCollector>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            upstream,
            stats,
            config,
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend once.
    ///
    /// Each verdict is applied as soon as its own probe finishes.
    pub async fn check_all(&self) -> ProbeSummary {
        let backends = self.registry.snapshot();
        let limit = self.config.max_concurrency.max(1);

        let results: Vec<bool> = stream::iter(backends.iter().cloned())
            .map(|backend| async move {
                let passed = self.probe(&backend).await;
                self.apply(&backend, passed, Instant::now());
                passed
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let passed = results.iter().filter(|p| **p).count();
        let mut summary = ProbeSummary {
            probed: results.len(),
            passed,
            failed: results.len() - passed,
            ..Default::default()
        };

        for backend in backends.iter() {
            if backend.is_healthy() {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }
        }

        tracing::debug!(
            probed = summary.probed,
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            "Health check cycle complete"
        );
        summary
    }

    /// Fold one probe result into the backend's health.
    fn apply(&self, backend: &Backend, passed: bool, now: Instant) {
        let verdict = backend.observe_probe(
            passed,
            self.config.healthy_threshold as usize,
            self.config.unhealthy_threshold as usize,
        );
        let healthy = match verdict {
            ProbeVerdict::Healthy => true,
            ProbeVerdict::Unhealthy => false,
            ProbeVerdict::Pending => return,
        };
        if let Some(transition) = self.registry.set_health_at(backend, healthy, now) {
            if transition.is_trip() {
                self.stats.record_trip();
            }
        }
    }

    /// One probe with its own timeout.
    async fn probe(&self, backend: &Backend) -> bool {
        let timeout: Duration = self.config.timeout();
        match time::timeout(timeout, self.upstream.probe(backend, &self.config.path)).await {
            Ok(Ok(status)) if status.is_success() => {
                tracing::debug!(backend = %backend.url, status = %status, "Health check passed");
                true
            }
            Ok(Ok(status)) => {
                tracing::warn!(backend = %backend.url, status = %status, "Health check failed: non-success status");
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %backend.url, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(backend = %backend.url, timeout = ?timeout, "Health check failed: timeout");
                false
            }
        }
    }
}
