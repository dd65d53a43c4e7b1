// src/server/router.rs

//! The request router: a single listener dispatching on the `Host` header.
//!
//! `GET /health` answers locally; everything else runs the admission chain
//! (rate limiter, domain resolution, domain status) and then the proxy
//! pipeline. Handler panics are caught and converted into `500` so no panic
//! escapes the request path.

use crate::core::metrics;
use crate::core::proxy::pipeline;
use crate::core::state::EdgeState;
use crate::core::OpalEdgeError;
use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{info, warn};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_DRAIN_BUDGET: Duration = Duration::from_secs(30);

/// How long background tasks get to observe the shutdown before being aborted.
const TASK_SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

/// Builds the proxy router.
pub fn build_router(state: Arc<EdgeState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy_handler)
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<EdgeState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "cache_size": state.cache.size().await,
    }))
}

async fn proxy_handler(
    State(state): State<Arc<EdgeState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let started = Instant::now();
    state.stats.increment_requests_handled();

    let response = match handle(&state, addr, req).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    };

    metrics::REQUEST_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
    response
}

/// The admission chain: host extraction, rate limiting, domain resolution,
/// domain status, then the pipeline.
async fn handle(
    state: &Arc<EdgeState>,
    addr: SocketAddr,
    req: Request,
) -> Result<Response, OpalEdgeError> {
    let host = request_host(req.headers())
        .ok_or_else(|| OpalEdgeError::InvalidRequest("missing Host header".to_string()))?;
    let client_ip = addr.ip().to_string();

    if !state.limiter.allow(&format!("{host}:{client_ip}")) {
        state.stats.increment_rate_limited();
        return Err(OpalEdgeError::RateLimited);
    }

    let domain = state.control.resolve_domain(&host).await?;
    if !domain.is_active() {
        return Err(OpalEdgeError::DomainInactive(host));
    }

    pipeline::serve(state, &domain, &client_ip, req).await
}

/// Extracts the destination host from the `Host` header, stripping any port.
/// IPv6 literals keep their brackets.
pub fn request_host(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::HOST)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(end) = raw.find(']') {
        // "[::1]:8080" -> "[::1]"
        return Some(raw[..=end].to_string());
    }
    match raw.split_once(':') {
        Some((host, _port)) => Some(host.to_string()),
        None => Some(raw.to_string()),
    }
}

fn rate_limited_response() -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate limit exceeded",
            "retry_after": "60s",
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
    response
}

fn error_response(error: &OpalEdgeError) -> Response {
    if matches!(error, OpalEdgeError::RateLimited) {
        return rate_limited_response();
    }
    let status = error.status_code();
    if status.is_server_error() {
        warn!("request failed: {}", error);
    }
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

/// Serves until a shutdown signal arrives, then drains in-flight requests
/// within the drain budget and reaps background tasks.
pub async fn run(ctx: super::context::EdgeContext) -> Result<()> {
    let super::context::EdgeContext {
        state,
        listener,
        shutdown_tx,
        mut background_tasks,
    } = ctx;

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received.");
        let _ = signal_tx.send(());
    });

    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let mut serve_shutdown_rx = shutdown_tx.subscribe();
    let graceful = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            serve_shutdown_rx.recv().await.ok();
        })
        .into_future();

    let mut drain_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = graceful => result?,
        _ = async {
            drain_rx.recv().await.ok();
            sleep(SHUTDOWN_DRAIN_BUDGET).await;
        } => {
            warn!(
                "Drain budget of {}s exceeded; abandoning in-flight requests.",
                SHUTDOWN_DRAIN_BUDGET.as_secs()
            );
        }
    }

    let reaped = tokio::time::timeout(TASK_SHUTDOWN_BUDGET, async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await;
    if reaped.is_err() {
        background_tasks.abort_all();
    }

    info!("Shutdown complete.");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
