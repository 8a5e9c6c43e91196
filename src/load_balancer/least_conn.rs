//! Least Connections load balancing strategy.

use std::sync::Arc;
use crate::config::Algorithm;
use crate::error::EngineError;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Least connections selector.
/// Selects the backend with the minimum number of active connections.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for LeastConnections {
    fn select(&self, eligible: &[Arc<Backend>]) -> Result<Arc<Backend>, EngineError> {
        // In case of tie, the first one in registration order is selected
        eligible
            .iter()
            .min_by_key(|b| b.connection_count())
            .cloned()
            .ok_or(EngineError::NoEligibleBackend)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeastConnections
    }
}
