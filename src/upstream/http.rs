//! HTTP/1.1 transport over a pooled hyper client.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use crate::load_balancer::backend::Backend;
use crate::upstream::{DispatchRequest, DispatchResponse, Upstream, UpstreamError};

/// Largest backend response body that will be buffered.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Hop-by-hop headers that must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
pub struct HttpUpstream {
    client: Client<HttpConnector, Body>,
    max_response_bytes: usize,
}

impl HttpUpstream {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

impl Default for HttpUpstream {
    fn default() -> Self {
        Self::new()
    }
}

/// Join the backend base URL with a request path.
///
/// A base path prefix (`http://host/api`) is kept in front of the request path.
pub fn target_uri(backend: &Backend, path_and_query: &str) -> Result<Uri, UpstreamError> {
    let base = backend.url.as_str().trim_end_matches('/');
    let path = if path_and_query.starts_with('/') {
        path_and_query.to_string()
    } else {
        format!("/{}", path_and_query)
    };
    format!("{}{}", base, path)
        .parse::<Uri>()
        .map_err(|e| UpstreamError::InvalidUri(e.to_string()))
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, backend: &Backend, request: &DispatchRequest) -> Result<DispatchResponse, UpstreamError> {
        let uri = target_uri(backend, &request.path_and_query)?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                if *name == header::HOST || HOP_BY_HOP.contains(&name.as_str()) {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
        }
        let req = builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| UpstreamError::InvalidUri(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes)
            .await
            .map_err(|e| UpstreamError::Body(e.to_string()))?;

        let mut headers = parts.headers;
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }

        Ok(DispatchResponse {
            status: parts.status,
            headers,
            body,
        })
    }

    async fn probe(&self, backend: &Backend, path: &str) -> Result<StatusCode, UpstreamError> {
        let uri = target_uri(backend, path)?;
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, "dispatch-engine-health")
            .body(Body::empty())
            .map_err(|e| UpstreamError::InvalidUri(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;
        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::backend;

    #[test]
    fn test_target_uri_joins_paths() {
        let b = backend("http://127.0.0.1:7000");
        assert_eq!(
            target_uri(&b, "/orders?id=7").unwrap().to_string(),
            "http://127.0.0.1:7000/orders?id=7"
        );

        let b = backend("http://127.0.0.1:7000/api/");
        assert_eq!(target_uri(&b, "/health").unwrap().to_string(), "http://127.0.0.1:7000/api/health");
        assert_eq!(target_uri(&b, "v1").unwrap().to_string(), "http://127.0.0.1:7000/api/v1");
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let b = backend(&format!("http://127.0.0.1:{}", port));
        let err = HttpUpstream::new().probe(&b, "/health").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect(_)));
    }
}
