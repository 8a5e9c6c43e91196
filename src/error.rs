//! Dispatch error taxonomy.
//!
//! Attempt-level errors (`AttemptTimeout`, `AttemptFailed`) are absorbed by the
//! orchestrator; callers of `Engine::dispatch` only ever see `NoEligibleBackend`,
//! `AllBackendsDown` or `DispatchFailed`.

use std::time::Duration;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Selection was handed an empty eligible set.
    #[error("no eligible backend")]
    NoEligibleBackend,

    /// A single attempt exceeded its deadline.
    #[error("attempt to {backend} timed out after {timeout:?}")]
    AttemptTimeout { backend: String, timeout: Duration },

    /// A backend answered with a non-2xx status or the connection failed.
    #[error("attempt to {backend} failed: {reason}")]
    AttemptFailed {
        backend: String,
        status: Option<StatusCode>,
        reason: String,
    },

    /// The eligible set was empty when the request arrived.
    #[error("all backends are down")]
    AllBackendsDown,

    /// The retry budget is exhausted.
    #[error("dispatch failed after {attempts} attempt(s): {last}")]
    DispatchFailed {
        attempts: u32,
        #[source]
        last: Box<EngineError>,
    },
}

impl EngineError {
    /// Whether another backend may be tried after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::AttemptTimeout { .. } | EngineError::AttemptFailed { .. })
    }

    /// Whether this error, or the last attempt behind it, was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            EngineError::AttemptTimeout { .. } => true,
            EngineError::DispatchFailed { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// HTTP status an ingress should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NoEligibleBackend | EngineError::AllBackendsDown => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::DispatchFailed {
            attempts: 2,
            last: Box::new(EngineError::AttemptFailed {
                backend: "http://a/".into(),
                status: Some(StatusCode::INTERNAL_SERVER_ERROR),
                reason: "status 500".into(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "dispatch failed after 2 attempt(s): attempt to http://a/ failed: status 500"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(EngineError::AllBackendsDown.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(EngineError::NoEligibleBackend.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let timed_out = EngineError::DispatchFailed {
            attempts: 1,
            last: Box::new(EngineError::AttemptTimeout {
                backend: "http://a/".into(),
                timeout: Duration::from_secs(1),
            }),
        };
        assert_eq!(timed_out.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(!timed_out.is_retryable());
    }
}
