//! Retry policy.
//!
//! # Responsibilities
//! - Bound the number of attempts per logical request
//! - Compute the backoff delay between attempts
//! - Derive the caller-visible overall deadline
//!
//! # Design Decisions
//! - Attempts within one request are strictly sequential
//! - Each retry goes to a different backend (enforced by the orchestrator)
//! - Backoff sleeps never hold a lock

use std::time::Duration;
use crate::config::{BackoffKind, RetryConfig};
use crate::resilience::backoff::{calculate_backoff, max_backoff};

/// Immutable retry settings derived from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Delay before retry number `retry` (1 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        calculate_backoff(self.backoff, retry, self.base_delay_ms, self.max_delay_ms)
    }

    /// Sum of every attempt timeout plus the largest possible backoffs.
    pub fn overall_deadline(&self) -> Duration {
        let backoffs: Duration = (1..self.max_attempts)
            .map(|retry| max_backoff(self.backoff, retry, self.base_delay_ms, self.max_delay_ms))
            .sum();
        self.attempt_timeout * self.max_attempts + backoffs
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
