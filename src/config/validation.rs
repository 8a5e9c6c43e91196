//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check backend identities are unique and parse as plain http URLs
//! - Validate value ranges (timeouts > 0, thresholds > 0, ratios in range)
//! - Reject invalid option combinations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use url::Url;
use crate::config::schema::EngineConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration, collecting every violation.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_backends(config, &mut errors);

    let hc = &config.health_check;
    if hc.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
    }
    if hc.timeout_secs == 0 {
        errors.push(ValidationError::new("health_check.timeout_secs", "must be greater than 0"));
    }
    if hc.unhealthy_threshold == 0 {
        errors.push(ValidationError::new("health_check.unhealthy_threshold", "must be greater than 0"));
    }
    if hc.healthy_threshold == 0 {
        errors.push(ValidationError::new("health_check.healthy_threshold", "must be greater than 0"));
    }
    if hc.max_concurrency == 0 {
        errors.push(ValidationError::new("health_check.max_concurrency", "must be greater than 0"));
    }
    if !hc.path.starts_with('/') {
        errors.push(ValidationError::new("health_check.path", "must start with '/'"));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be greater than 0"));
    }
    if cb.window_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.window_secs", "must be greater than 0"));
    }
    if cb.open_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.open_secs", "must be greater than 0"));
    }
    if !(cb.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("circuit_breaker.backoff_multiplier", "must be at least 1.0"));
    }
    if cb.open_secs > cb.max_open_secs {
        errors.push(ValidationError::new("circuit_breaker.max_open_secs", "must not be less than open_secs"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be greater than 0"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed max_delay_ms"));
    }
    if retries.attempt_timeout_ms == 0 {
        errors.push(ValidationError::new("retries.attempt_timeout_ms", "must be greater than 0"));
    }

    let sa = &config.session_affinity;
    if sa.enabled {
        if sa.ttl_secs == 0 {
            errors.push(ValidationError::new("session_affinity.ttl_secs", "must be greater than 0"));
        }
        if sa.max_entries == 0 {
            errors.push(ValidationError::new("session_affinity.max_entries", "must be greater than 0"));
        }
        if sa.sweep_interval_secs == 0 {
            errors.push(ValidationError::new("session_affinity.sweep_interval_secs", "must be greater than 0"));
        }
        if sa.header.is_empty() && sa.cookie.is_empty() {
            errors.push(ValidationError::new("session_affinity", "header or cookie must be set"));
        }
    }

    let decay = config.stats.latency_decay;
    if !(decay > 0.0 && decay <= 1.0) {
        errors.push(ValidationError::new("stats.latency_decay", "must be in (0, 1]"));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backends(config: &EngineConfig, errors: &mut Vec<ValidationError>) {
    if config.backends.is_empty() {
        errors.push(ValidationError::new("backends", "at least one backend is required"));
        return;
    }

    let mut names = HashSet::new();
    let mut urls = HashSet::new();

    for (i, backend) in config.backends.iter().enumerate() {
        let field = |name: &str| format!("backends[{}].{}", i, name);

        if !names.insert(backend.name.as_str()) {
            errors.push(ValidationError::new(field("name"), format!("duplicate name '{}'", backend.name)));
        }

        match Url::parse(&backend.url) {
            Ok(url) if url.scheme() == "http" => {
                if url.host_str().is_none() {
                    errors.push(ValidationError::new(field("url"), "missing host"));
                }
                if !urls.insert(url.to_string()) {
                    errors.push(ValidationError::new(field("url"), format!("duplicate url '{}'", backend.url)));
                }
            }
            Ok(url) => {
                errors.push(ValidationError::new(field("url"), format!("unsupported scheme '{}'", url.scheme())));
            }
            Err(e) => {
                errors.push(ValidationError::new(field("url"), format!("invalid url: {}", e)));
            }
        }

        if backend.weight == 0 {
            errors.push(ValidationError::new(field("weight"), "must be greater than 0"));
        }
        if backend.max_connections == 0 {
            errors.push(ValidationError::new(field("max_connections"), "must be greater than 0"));
        }
    }
}
