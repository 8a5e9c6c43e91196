//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → handed to Engine::new at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Registry::replace_backends swaps the backend set atomically
//! ```
//!
//! # Design Decisions
//! - Every recognized option is an explicit field; unknown shapes fail to parse
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the backend set is hot-reloadable; the algorithm is fixed per deployment

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, Algorithm, BackendConfig, BackoffKind, CircuitBreakerConfig, EngineConfig,
    HealthCheckConfig, ListenerConfig, LogFormat, ObservabilityConfig, RetryConfig,
    SessionAffinityConfig, StatsConfig,
};
