//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch needs a backend
//!     → registry.rs (snapshot of eligible backends, registration order)
//!     → Apply the deployment's selection algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - weighted.rs (draw proportionally to weight)
//!         - least_conn.rs (pick backend with fewest connections)
//!         - random.rs (uniform draw)
//!     → backend.rs (claim connection slot + circuit permission)
//!     → Return guard or NoEligibleBackend
//! ```
//!
//! # Design Decisions
//! - Algorithms only choose; the registry decides eligibility
//! - One algorithm per deployment, chosen at construction
//! - Open circuits and unhealthy backends never reach an algorithm
//! - Per-backend state lives in atomics plus one mutex per backend

pub mod backend;
pub mod least_conn;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod weighted;

use std::sync::Arc;
use crate::config::Algorithm;
use crate::error::EngineError;
use self::backend::Backend;

/// A backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Choose one backend from `eligible`, which is in registration order.
    ///
    /// Fails with [`EngineError::NoEligibleBackend`] when `eligible` is empty.
    fn select(&self, eligible: &[Arc<Backend>]) -> Result<Arc<Backend>, EngineError>;

    fn algorithm(&self) -> Algorithm;
}

/// Build the selector for a configured algorithm.
pub fn from_algorithm(algorithm: Algorithm) -> Box<dyn LoadBalancer> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Algorithm::Weighted => Box::new(weighted::Weighted::new()),
        Algorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Algorithm::Random => Box::new(random::Random::new()),
    }
}
