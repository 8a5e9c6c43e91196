//! Retry backoff with jitter.

use std::time::Duration;
use rand::Rng;
use crate::config::BackoffKind;

/// Calculate the delay before retry number `attempt` (1-based), with jitter.
///
/// Linear grows as `base * attempt`, exponential as `base * 2^(attempt - 1)`;
/// both are capped at `max_ms` before up to 10% jitter is added.
pub fn calculate_backoff(kind: BackoffKind, attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let capped_delay = base_delay(kind, attempt, base_ms).min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Upper bound of [`calculate_backoff`] for the given attempt.
pub fn max_backoff(kind: BackoffKind, attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let capped_delay = base_delay(kind, attempt, base_ms).min(max_ms);
    Duration::from_millis(capped_delay + capped_delay / 10)
}

fn base_delay(kind: BackoffKind, attempt: u32, base_ms: u64) -> u64 {
    match kind {
        BackoffKind::Linear => base_ms.saturating_mul(attempt as u64),
        BackoffKind::Exponential => {
            let exponential_base = 2u64.saturating_pow(attempt - 1);
            base_ms.saturating_mul(exponential_base)
        }
    }
}
