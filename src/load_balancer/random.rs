//! Uniform random load balancing strategy.

use std::sync::Arc;
use crate::config::Algorithm;
use crate::error::EngineError;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Uniform random selector.
#[derive(Debug, Default)]
pub struct Random;

impl Random {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Random {
    fn select(&self, eligible: &[Arc<Backend>]) -> Result<Arc<Backend>, EngineError> {
        if eligible.is_empty() {
            return Err(EngineError::NoEligibleBackend);
        }
        Ok(eligible[fastrand::usize(..eligible.len())].clone())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Random
    }
}
