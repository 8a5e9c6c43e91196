//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all dispatch handler
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener with graceful shutdown
//! - Hand every request to the engine

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::engine::Engine;
use crate::http::request::{buffer_request, UuidRequestId, X_REQUEST_ID};
use crate::http::response::from_dispatch;
use crate::session::session_key;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Ingress server in front of the engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        let router = Self::build_router(AppState { engine });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Buffer the request, resolve its session key and dispatch it.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let config = state.engine.config();

    let request = match buffer_request(request, config.listener.max_body_bytes).await {
        Ok(r) => r,
        Err(status) => return (status, "Request body too large").into_response(),
    };
    let key = session_key(&request.headers, &config.session_affinity);

    tracing::debug!(
        request_id = request.request_id().unwrap_or("unknown"),
        method = %request.method,
        path = %request.path_and_query,
        "Dispatching request"
    );

    match state.engine.dispatch(&request, key.as_deref()).await {
        Ok(response) => from_dispatch(response),
        Err(e) => e.into_response(),
    }
}
