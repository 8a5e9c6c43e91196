//! A pretend backend for trying the engine by hand.
//!
//! ```text
//! cargo run --example mock_backend -- 7001 alpha
//! ```
//! Touch `/tmp/<name>.down` to make its health endpoint fail.

use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().as_deref().unwrap_or("7001").parse()?;
    let name = args.next().unwrap_or_else(|| format!("backend-{}", port));

    let marker = PathBuf::from(format!("/tmp/{}.down", name));
    let greeting = format!("Hello from {}", name);

    let app = Router::new()
        .route("/", get(move || async move { greeting }))
        .route(
            "/health",
            get(move || {
                let down = marker.exists();
                async move {
                    if down {
                        (StatusCode::SERVICE_UNAVAILABLE, "down")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }
            }),
        );

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("{} listening on http://{}", name, addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
