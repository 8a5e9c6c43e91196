//! Backend transport.
//!
//! # Responsibilities
//! - Carry a fully buffered request so it can be replayed on retry
//! - Send one attempt to one backend
//! - Issue lightweight health probes
//!
//! The orchestrator and health monitor only see the [`Upstream`] trait, so tests
//! can substitute scripted transports.

pub mod http;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use thiserror::Error;
use crate::load_balancer::backend::Backend;

pub use self::http::HttpUpstream;

/// A buffered inbound request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: Method,
    /// Path plus optional query, e.g. `/orders?id=7`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DispatchRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The `x-request-id` header, if present.
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get("x-request-id").and_then(|v| v.to_str().ok())
    }
}

/// A buffered backend response.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DispatchResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Transport to backends.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send one attempt. Non-2xx statuses are returned as responses.
    async fn send(&self, backend: &Backend, request: &DispatchRequest) -> Result<DispatchResponse, UpstreamError>;

    /// Probe `path` on the backend and return the status it answered with.
    async fn probe(&self, backend: &Backend, path: &str) -> Result<StatusCode, UpstreamError>;
}
