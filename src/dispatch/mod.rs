//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! DispatchRequest (+ optional session key)
//!     → sticky mapping still eligible? use it
//!     → otherwise LoadBalancer::select over the eligible set
//!     → Backend::try_acquire (connection slot + circuit permission)
//!     → Upstream::send under the attempt timeout
//!     → Registry::record_outcome + StatsCollector
//!     → success: bind session, return
//!     → failure: backoff, retry on a backend not yet tried
//! ```

pub mod orchestrator;
