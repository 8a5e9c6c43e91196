//! Administrative API.
//!
//! Bearer-token protected; bound to its own listener, separate from ingress.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use crate::engine::Engine;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<Engine>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(engine: Arc<Engine>) -> Router {
    let api_key: Arc<str> = Arc::from(engine.config().admin.api_key.as_str());
    let state = AdminState { engine, api_key };

    Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/stats/reset", post(reset_stats))
        .route("/admin/health", get(get_health))
        .route("/admin/health/check", post(trigger_health_check))
        .route("/admin/config", get(get_config))
        .route("/admin/sessions/clear", post(clear_sessions))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, EngineConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn engine() -> Arc<Engine> {
        let mut config = EngineConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "test-key".into();
        config.backends.push(BackendConfig::new("a", "http://127.0.0.1:7400"));
        Arc::new(Engine::new(config).unwrap())
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let router = setup_admin_router(engine());

        let response = router.clone().oneshot(request("GET", "/admin/stats", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router.oneshot(request("GET", "/admin/stats", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stats_and_config() {
        let router = setup_admin_router(engine());

        let response = router.clone().oneshot(request("GET", "/admin/stats", Some("test-key"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["total_backends"], 1);
        assert_eq!(body["algorithm"], "round_robin");

        let response = router.oneshot(request("GET", "/admin/config", Some("test-key"))).await.unwrap();
        let body = json(response).await;
        assert_eq!(body["backends"][0]["weight"], 1);
        assert_eq!(body["session_ttl_secs"], 1800);
    }

    #[tokio::test]
    async fn test_clear_sessions_and_reset() {
        let engine = engine();
        engine.sessions().bind("k", "http://127.0.0.1:7400/");
        engine.stats_collector().record_request(true);
        let router = setup_admin_router(engine.clone());

        let response = router
            .clone()
            .oneshot(request("POST", "/admin/sessions/clear", Some("test-key")))
            .await
            .unwrap();
        assert_eq!(json(response).await["cleared"], 1);
        assert!(engine.sessions().is_empty());

        router.oneshot(request("POST", "/admin/stats/reset", Some("test-key"))).await.unwrap();
        assert_eq!(engine.stats_collector().snapshot().total_requests, 0);
    }

    #[tokio::test]
    async fn test_health_reports_unhealthy() {
        let engine = engine();
        let backend = engine.registry().snapshot()[0].clone();
        engine.registry().set_health(&backend, false);

        let response = setup_admin_router(engine)
            .oneshot(request("GET", "/admin/health", Some("test-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["status"], "unhealthy");
    }
}
