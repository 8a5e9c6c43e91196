//! Weighted random load balancing strategy.

use std::sync::Arc;
use rand::Rng;
use crate::config::Algorithm;
use crate::error::EngineError;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Draws a backend with probability proportional to its static weight.
#[derive(Debug, Default)]
pub struct Weighted;

impl Weighted {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Weighted {
    fn select(&self, eligible: &[Arc<Backend>]) -> Result<Arc<Backend>, EngineError> {
        if eligible.is_empty() {
            return Err(EngineError::NoEligibleBackend);
        }

        let total: u64 = eligible.iter().map(|b| b.weight as u64).sum();
        if total == 0 {
            return Ok(eligible[fastrand::usize(..eligible.len())].clone());
        }

        let mut point = rand::thread_rng().gen_range(0..total);
        for backend in eligible {
            let weight = backend.weight as u64;
            if point < weight {
                return Ok(backend.clone());
            }
            point -= weight;
        }

        // Unreachable while `point < total`.
        Ok(eligible[eligible.len() - 1].clone())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Weighted
    }
}
