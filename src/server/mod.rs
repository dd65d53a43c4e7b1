// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod context;
mod initialization;
mod metrics_server;
pub mod router;
mod spawner;

pub use context::EdgeContext;

/// The main edge startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize state, cache backend, listeners, and register with the
    //    control plane.
    let mut ctx = initialization::setup(config).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut ctx)?;

    // 3. Serve until shutdown. This function will run until a signal arrives.
    router::run(ctx).await
}
