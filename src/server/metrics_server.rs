// src/server/metrics_server.rs

use crate::core::metrics;
use crate::core::metrics::gather_metrics;
use crate::core::state::EdgeState;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint.
///
/// It updates dynamic gauges before gathering all registered metrics
/// and encoding them in the Prometheus text format.
async fn metrics_handler(state: Arc<EdgeState>) -> impl IntoResponse {
    // Update gauges that change frequently before gathering.
    metrics::CACHE_SIZE.set(state.cache.size().await as f64);
    metrics::RATE_LIMIT_BUCKETS.set(state.limiter.bucket_count() as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Runs a simple HTTP server to expose Prometheus metrics on /metrics.
pub async fn run_metrics_server(state: Arc<EdgeState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.metrics_port;

    let app = Router::new()
        .route("/metrics", get(move || metrics_handler(state.clone())))
        .route("/health", get(health_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        "Prometheus metrics server listening on http://{}/metrics",
        addr
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on port {}: {}", port, e);
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await
        .unwrap();
}
