//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch attempt to backend:
//!     → per-attempt timeout (tokio::time::timeout)
//!     → circuit_breaker.rs (track failures, open circuit if threshold exceeded)
//!     → On failure: retries.rs (budget left? pick another backend after backoff.rs delay)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Circuit breaker prevents hammering a failing backend
//! - Backoff grows linearly or exponentially, capped, with jitter

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitTransition, Permit};
pub use retries::RetryPolicy;
