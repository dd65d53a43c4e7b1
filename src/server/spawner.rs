// src/server/spawner.rs

//! Spawns all of the edge's long-running background tasks.

use super::context::EdgeContext;
use super::metrics_server;
use crate::core::tasks::heartbeat::HeartbeatTask;
use crate::core::tasks::limiter_gc::LimiterCompactionTask;
use crate::core::tasks::purge_worker::PurgeWorkerTask;
use anyhow::Result;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet. Each task gets its
/// own subscription to the shutdown channel and exits between cycles.
pub fn spawn_all(ctx: &mut EdgeContext) -> Result<()> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    let metrics_state = state.clone();
    let shutdown_rx_metrics = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await;
        Ok(())
    });

    // --- Control-plane heartbeat ---
    let heartbeat = HeartbeatTask::new(state.clone());
    let shutdown_rx_heartbeat = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        heartbeat.run(shutdown_rx_heartbeat).await;
        Ok(())
    });

    // --- Purge worker ---
    let purge_worker = PurgeWorkerTask::new(state.clone());
    let shutdown_rx_purge = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        purge_worker.run(shutdown_rx_purge).await;
        Ok(())
    });

    // --- Rate-limiter compaction ---
    let limiter_gc = LimiterCompactionTask::new(state.clone());
    let shutdown_rx_limiter = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        limiter_gc.run(shutdown_rx_limiter).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
