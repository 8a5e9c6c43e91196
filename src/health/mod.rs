//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer or manual trigger
//!     → Probe every backend concurrently (bounded, isolated timeouts)
//!     → Backend::observe_probe (consecutive-result thresholds)
//!     → Registry::set_health (health flag + circuit open / half-open)
//!
//! Reporting (report.rs):
//!     Registry snapshot → overall status + per-backend detail
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - Probe failures never propagate to callers; they only mutate backend state
//! - Health state is per-backend, not per-pool

pub mod active;
pub mod report;

pub use active::{HealthMonitor, ProbeSummary};
pub use report::{BackendDetail, HealthReport, HealthStatus};
