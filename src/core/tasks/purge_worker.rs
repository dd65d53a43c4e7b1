// src/core/tasks/purge_worker.rs

//! A background task that pulls pending purge instructions from the control
//! plane, applies them to the cache, and acknowledges the ones that applied
//! cleanly.
//!
//! An unacknowledged task is redelivered on a later poll; deleting
//! already-missing keys is a no-op, so redelivery is safe. Individual task
//! failures never abort the batch.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::core::proxy::purge;
use crate::core::state::EdgeState;

/// The background task struct for the purge worker.
pub struct PurgeWorkerTask {
    state: Arc<EdgeState>,
}

impl PurgeWorkerTask {
    /// Creates a new `PurgeWorkerTask`.
    pub fn new(state: Arc<EdgeState>) -> Self {
        Self { state }
    }

    /// The main run loop. Polls for pending purges on the configured
    /// interval until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Purge worker started.");
        let mut interval = tokio::time::interval(self.state.config.purge_poll_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Purge worker shutting down.");
                    return;
                }
            }
        }
    }

    /// Performs a single pull-apply-acknowledge cycle.
    pub async fn run_cycle(&self) {
        let edge_id = &self.state.identity.id;
        let tasks = match self.state.control.pending_purges(edge_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("failed to pull pending purges: {}", e);
                return;
            }
        };

        for task in tasks {
            let domain = match self.state.control.resolve_domain_by_id(&task.domain_id).await {
                Ok(domain) => domain,
                Err(e) => {
                    warn!(
                        "skipping purge task '{}': domain '{}' lookup failed: {}",
                        task.id, task.domain_id, e
                    );
                    continue;
                }
            };

            match purge::purge(&self.state, &domain.domain, &task.paths).await {
                Ok(()) => {
                    info!(
                        "applied purge task '{}' for domain '{}' ({} paths)",
                        task.id,
                        domain.domain,
                        task.paths.len()
                    );
                    if let Err(e) = self.state.control.complete_purge(edge_id, &task.id).await {
                        warn!("failed to acknowledge purge task '{}': {}", task.id, e);
                    }
                }
                // Left unacknowledged so the control plane redelivers it.
                Err(e) => warn!("purge task '{}' failed: {}", task.id, e),
            }
        }
    }
}
