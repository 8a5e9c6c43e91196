//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (health checks, session sweeper, config reload)
//! - Bind listeners and begin accepting traffic
//! - Wait for every task to wind down after shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use crate::admin::setup_admin_router;
use crate::config::watcher::{apply_updates, ConfigWatcher};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Run the engine until a termination signal arrives.
///
/// `config_path`, when set, is watched and backend changes are applied live.
pub async fn run(config: EngineConfig, config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let ingress_addr = config.listener.bind_address.clone();
    let admin = config.admin.clone();

    let engine = Arc::new(Engine::new(config)?);
    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(engine.health_monitor().clone().run(shutdown.subscribe())));

    if engine.sessions().is_enabled() {
        let sessions = engine.sessions().clone();
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move { sessions.run(rx).await }));
    }

    // Dropping the watcher handle stops the watch.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            let handle = watcher.run()?;
            let reload_engine = engine.clone();
            tasks.push(tokio::spawn(apply_updates(updates, shutdown.subscribe(), move |next| {
                match reload_engine.reload(next) {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Rejected reloaded configuration"),
                }
            })));
            Some(handle)
        }
        None => None,
    };

    if admin.enabled {
        let listener = TcpListener::bind(&admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(engine.clone());
        let signalled = shutdown.signalled();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(signalled).await {
                tracing::error!(error = %e, "Admin server failed");
            }
        }));
    }

    let listener = TcpListener::bind(&ingress_addr).await?;
    let result = HttpServer::new(engine).run(listener, shutdown.signalled()).await;

    // The ingress may have stopped on its own; make sure everything else follows.
    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    result.map_err(Into::into)
}
