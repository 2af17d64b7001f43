//! Dedicated Prometheus metrics HTTP server.
//!
//! When `--metrics-addr` is set, this starts a minimal HTTP server that
//! serves only the `/metrics` endpoint for Prometheus scraping.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::runtime::SimRuntime;

/// Start the dedicated metrics server.
pub async fn run(runtime: Arc<SimRuntime>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(runtime);

    tracing::info!(%addr, "prometheus metrics server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler(State(runtime): State<Arc<SimRuntime>>) -> impl IntoResponse {
    let body = runtime.render_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}
