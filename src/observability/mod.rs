//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch attempts, probes and circuit transitions produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (Prometheus counters, gauges, histograms)
//!     → stats.rs (in-process aggregate served by the admin API)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin stats query
//! ```
//!
//! # Design Decisions
//! - Structured logging with per-backend fields
//! - Metrics and stats are cheap (atomic operations)
//! - Stats snapshots never block writers

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{StatsCollector, StatsSnapshot};
