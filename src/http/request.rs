//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the client sent none
//! - Enforce the body size limit while buffering
//! - Extract the sticky-session key
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is buffered once so retries can replay it

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;
use crate::upstream::DispatchRequest;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Makes a UUID v4 request ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Buffer an inbound request into a replayable [`DispatchRequest`].
pub async fn buffer_request(request: Request<Body>, max_body_bytes: usize) -> Result<DispatchRequest, StatusCode> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    Ok(DispatchRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    })
}
