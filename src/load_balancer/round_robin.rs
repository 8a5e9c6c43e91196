//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::config::Algorithm;
use crate::error::EngineError;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Round-robin selector.
///
/// The cursor holds the registration position to start the next search from,
/// so a backend that drops out of the eligible set is skipped without
/// disturbing the rotation of the others.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn pick(eligible: &[Arc<Backend>], cursor: usize) -> usize {
        eligible
            .iter()
            .position(|b| b.position() >= cursor)
            .unwrap_or(0)
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, eligible: &[Arc<Backend>]) -> Result<Arc<Backend>, EngineError> {
        if eligible.is_empty() {
            return Err(EngineError::NoEligibleBackend);
        }

        let mut prev = self.cursor.load(Ordering::Relaxed);
        loop {
            let index = Self::pick(eligible, prev);
            let next = eligible[index].position() + 1;
            match self.cursor.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return Ok(eligible[index].clone()),
                Err(x) => prev = x,
            }
        }
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::RoundRobin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::pool;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let backends = pool(&[1, 1]);

        let s1 = lb.select(&backends).unwrap();
        assert_eq!(s1.url, backends[0].url);

        let s2 = lb.select(&backends).unwrap();
        assert_eq!(s2.url, backends[1].url);

        let s3 = lb.select(&backends).unwrap();
        assert_eq!(s3.url, backends[0].url);
    }

    #[test]
    fn test_each_visited_once_per_cycle() {
        for k in 1..=7 {
            let lb = RoundRobin::new();
            let backends = pool(&vec![1; k]);
            for _ in 0..3 {
                let mut seen: Vec<usize> = (0..k).map(|_| lb.select(&backends).unwrap().position()).collect();
                seen.sort_unstable();
                assert_eq!(seen, (0..k).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_skips_backend_that_became_ineligible() {
        let lb = RoundRobin::new();
        let all = pool(&[1, 1, 1]);

        assert_eq!(lb.select(&all).unwrap().position(), 0);

        // Backend 1 drops out; rotation continues with 2, then wraps to 0.
        let without_1 = vec![all[0].clone(), all[2].clone()];
        assert_eq!(lb.select(&without_1).unwrap().position(), 2);
        assert_eq!(lb.select(&without_1).unwrap().position(), 0);

        // It comes back and takes its turn in registration order.
        assert_eq!(lb.select(&all).unwrap().position(), 1);
        assert_eq!(lb.select(&all).unwrap().position(), 2);
    }
}
