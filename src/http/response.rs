//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a buffered backend response into a client response
//! - Map terminal dispatch errors to HTTP status codes
//!
//! # Design Decisions
//! - Hop-by-hop headers are already stripped by the upstream transport
//! - Backend timeouts result in 504 Gateway Timeout
//! - No eligible backend results in 503 Service Unavailable

use axum::body::Body;
use axum::http::{HeaderValue, Response};
use axum::response::IntoResponse;
use crate::error::EngineError;
use crate::upstream::DispatchResponse;

pub fn from_dispatch(dispatched: DispatchResponse) -> Response<Body> {
    let mut response = Response::new(Body::from(dispatched.body));
    *response.status_mut() = dispatched.status;
    *response.headers_mut() = dispatched.headers;
    response
}

impl IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let mut response = (status, self.to_string()).into_response();
        if let EngineError::AllBackendsDown | EngineError::NoEligibleBackend = self {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_statuses() {
        let response = EngineError::AllBackendsDown.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("retry-after"));

        let timeout = EngineError::DispatchFailed {
            attempts: 1,
            last: Box::new(EngineError::AttemptTimeout {
                backend: "http://a/".into(),
                timeout: std::time::Duration::from_secs(1),
            }),
        };
        assert_eq!(timeout.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_from_dispatch_keeps_status_and_body() {
        let response = from_dispatch(DispatchResponse::new(StatusCode::CREATED).with_body("done"));
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
