// src/core/tasks/limiter_gc.rs

//! A background janitor that drops idle rate-limiter buckets.
//!
//! A bucket that has refilled to a full burst has seen no traffic for at
//! least `burst / rps` seconds, so holding it costs memory for nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::metrics;
use crate::core::state::EdgeState;

/// The interval at which idle buckets are collected.
const COMPACTION_INTERVAL: Duration = Duration::from_secs(300);

/// The background task struct for rate-limiter compaction.
pub struct LimiterCompactionTask {
    state: Arc<EdgeState>,
}

impl LimiterCompactionTask {
    /// Creates a new `LimiterCompactionTask`.
    pub fn new(state: Arc<EdgeState>) -> Self {
        Self { state }
    }

    /// The main run loop. Compacts the bucket map every five minutes until
    /// shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Rate-limiter compaction task started.");
        let mut interval = tokio::time::interval(COMPACTION_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.state.limiter.compact();
                    let remaining = self.state.limiter.bucket_count();
                    metrics::RATE_LIMIT_BUCKETS.set(remaining as f64);
                    if removed > 0 {
                        debug!("compacted {} idle rate-limit buckets, {} remain", removed, remaining);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Rate-limiter compaction task shutting down.");
                    return;
                }
            }
        }
    }
}
