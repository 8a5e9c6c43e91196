//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the dispatch engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Ingress listener that forwards requests into the engine.
    pub listener: ListenerConfig,

    /// Backend selection algorithm (fixed for the lifetime of the process).
    pub algorithm: Algorithm,

    /// Backend server definitions, in registration order.
    pub backends: Vec<BackendConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Sticky session settings.
    pub session_affinity: SessionAffinityConfig,

    /// Stats aggregation settings.
    pub stats: StatsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum buffered request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Backend selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    Weighted,
    LeastConnections,
    Random,
}

impl Algorithm {
    /// Wire name, as used in config files and the admin API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round_robin",
            Algorithm::Weighted => "weighted",
            Algorithm::LeastConnections => "least_connections",
            Algorithm::Random => "random",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Human-readable backend identifier.
    pub name: String,

    /// Base URL of the backend (e.g., "http://127.0.0.1:3000").
    pub url: String,

    /// Weight for weighted selection (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Maximum concurrent connections to this backend.
    #[serde(default = "default_max_backend_conns")]
    pub max_connections: usize,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            weight: default_weight(),
            max_connections: default_max_backend_conns(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

fn default_weight() -> u32 {
    1
}

fn default_max_backend_conns() -> usize {
    100
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before an unhealthy backend is restored.
    pub healthy_threshold: u32,

    /// Upper bound on probes in flight at once.
    pub max_concurrency: usize,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 1,
            max_concurrency: 8,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that trip the circuit.
    pub failure_threshold: u32,

    /// Rolling window length in seconds.
    pub window_secs: u64,

    /// Cool-down before the first half-open probe, in seconds.
    pub open_secs: u64,

    /// Cool-down growth factor on repeated trips (1.0 keeps it fixed).
    pub backoff_multiplier: f64,

    /// Cool-down cap in seconds.
    pub max_open_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_secs)
    }

    pub fn max_open_duration(&self) -> Duration {
        Duration::from_secs(self.max_open_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_secs: 60,
            open_secs: 30,
            backoff_multiplier: 1.0,
            max_open_secs: 300,
        }
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Linear,
    #[default]
    Exponential,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per request, the first one included.
    pub max_attempts: u32,

    /// Backoff growth between attempts.
    pub backoff: BackoffKind,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Per-attempt timeout in milliseconds.
    pub attempt_timeout_ms: u64,
}

impl RetryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            attempt_timeout_ms: 5000,
        }
    }
}

/// Sticky session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionAffinityConfig {
    /// Enable sticky sessions.
    pub enabled: bool,

    /// Mapping lifetime, measured from creation.
    pub ttl_secs: u64,

    /// Maximum number of live mappings.
    pub max_entries: usize,

    /// Header carrying the session key.
    pub header: String,

    /// Cookie consulted when the header is absent.
    pub cookie: String,

    /// Period of the expired-mapping sweep.
    pub sweep_interval_secs: u64,
}

impl SessionAffinityConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SessionAffinityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 1800,
            max_entries: 100_000,
            header: "x-session-id".to_string(),
            cookie: "session_id".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Stats aggregation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// EWMA smoothing factor for latency, in (0, 1].
    pub latency_decay: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { latency_decay: 0.2 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            algorithm = "least_connections"

            [[backends]]
            name = "a"
            url = "http://127.0.0.1:3000"

            [[backends]]
            name = "b"
            url = "http://127.0.0.1:3001"
            weight = 3

            [retries]
            backoff = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.algorithm, Algorithm::LeastConnections);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].weight, 1);
        assert_eq!(config.backends[1].weight, 3);
        assert_eq!(config.retries.backoff, BackoffKind::Linear);
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.health_check.unhealthy_threshold, 3);
        assert!(!config.session_affinity.enabled);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = AdminConfig::default();
        config.api_key = "secret".into();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
