//! Sticky sessions.
//!
//! # Data Flow
//! ```text
//! Inbound request → session key (header, then cookie)
//!     → SessionAffinity::get → live mapping? → preferred backend
//!     → successful dispatch → SessionAffinity::bind
//! Sweeper task → purge_expired (every sweep_interval_secs)
//! ```

pub mod affinity;

pub use affinity::{session_key, SessionAffinity, SessionMapping, SessionSummary};
