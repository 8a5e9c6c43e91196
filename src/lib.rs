//! Load-balancing request dispatch engine.
//!
//! Build an [`Engine`] from an [`EngineConfig`] and call
//! [`Engine::dispatch`]; everything else (health checks, circuit breaking,
//! sticky sessions, stats) hangs off that one value.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;
pub mod session;
pub mod upstream;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use upstream::{DispatchRequest, DispatchResponse, Upstream};
