//! Dispatch engine.
//!
//! Load-balancing front end for a pool of HTTP backends.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http ingress ──▶ Engine::dispatch
//!                                         │
//!                                         ├─▶ session affinity (sticky mapping)
//!                                         ├─▶ registry (eligible set) ─▶ load_balancer (select)
//!                                         ├─▶ upstream (attempt, timeout) ─────────────────▶ Backend
//!                                         └─▶ circuit breaker + stats (every attempt)
//!
//!     Background: health monitor (probes) · session sweeper · config watcher
//!     Side surfaces: admin API · Prometheus metrics
//! ```

use std::path::PathBuf;
use clap::Parser;
use dispatch_engine::config::loader::load_config;
use dispatch_engine::lifecycle::startup;
use dispatch_engine::observability::logging;

#[derive(Parser)]
#[command(name = "dispatch-engine")]
#[command(about = "Load-balancing request dispatch engine", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "engine.toml")]
    config: PathBuf,

    /// Do not reload the backend set when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatch-engine starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        algorithm = %config.algorithm,
        backends = config.backends.len(),
        "Configuration loaded"
    );

    let watch = (!args.no_watch).then(|| args.config.clone());
    startup::run(config, watch).await
}
