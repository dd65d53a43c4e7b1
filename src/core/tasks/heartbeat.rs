// src/core/tasks/heartbeat.rs

//! A background task that periodically reports liveness and basic metrics to
//! the control plane. Heartbeat failures are logged and never fatal; the
//! edge keeps serving from its last-known state.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::state::EdgeState;

/// The background task struct for the control-plane heartbeat.
pub struct HeartbeatTask {
    state: Arc<EdgeState>,
}

impl HeartbeatTask {
    /// Creates a new `HeartbeatTask`.
    pub fn new(state: Arc<EdgeState>) -> Self {
        Self { state }
    }

    /// The main run loop. Sends one heartbeat per configured interval until
    /// shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Heartbeat task started.");
        let mut interval = tokio::time::interval(self.state.config.heartbeat_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.send_heartbeat().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Heartbeat task shutting down.");
                    return;
                }
            }
        }
    }

    /// Sends a single heartbeat carrying the current cache size and request
    /// counters.
    pub async fn send_heartbeat(&self) {
        let stats = &self.state.stats;
        let metrics = json!({
            "cache_size": self.state.cache.size().await,
            "timestamp": chrono::Utc::now().timestamp(),
            "requests_handled": stats.get_requests_handled(),
            "cache_hits": stats.get_cache_hits(),
            "cache_misses": stats.get_cache_misses(),
        });

        match self
            .state
            .control
            .heartbeat(&self.state.identity.id, "healthy", metrics)
            .await
        {
            Ok(()) => debug!("heartbeat sent"),
            Err(e) => warn!("heartbeat failed: {}", e),
        }
    }
}
