// src/server/initialization.rs

//! Handles the complete edge initialization process: cache backend selection,
//! control-plane registration, and listener binding.

use super::context::EdgeContext;
use crate::config::Config;
use crate::core::cache::CacheStore;
use crate::core::cache::memory::MemoryCache;
use crate::core::cache::redis::RedisCache;
use crate::core::control::{ControlPlaneClient, EdgeIdentity, RegisterRequest};
use crate::core::rate_limit::RateLimiter;
use crate::core::state::{EdgeState, EdgeStats};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all edge components before starting the serve loop.
/// Registration with the control plane happens here; a failure is fatal.
pub async fn setup(config: Config) -> Result<EdgeContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let cache = build_cache(&config).await?;
    info!("Cache backend '{}' is ready.", cache.backend_name());

    let control =
        ControlPlaneClient::new(&config.control_plane_url, config.control_plane_timeout())?;
    let identity = register_edge(&config, &control).await?;
    info!("Registered with control plane as edge '{}'.", identity.id);

    let origin_client = EdgeState::build_origin_client(&config)?;
    let limiter = RateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("OpalEdge proxy listening on 0.0.0.0:{}", config.port);

    let state = Arc::new(EdgeState {
        config,
        cache,
        limiter,
        control,
        origin_client,
        identity,
        stats: EdgeStats::new(),
    });

    Ok(EdgeContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Selects the cache backend: Redis when a URL is configured, the in-memory
/// store otherwise.
async fn build_cache(config: &Config) -> Result<CacheStore> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisCache::connect(url)
                .await
                .with_context(|| format!("Failed to connect to Redis at '{url}'"))?;
            Ok(CacheStore::Redis(store))
        }
        None => Ok(CacheStore::Memory(MemoryCache::new(
            config.cache_size,
            config.max_body_bytes,
        ))),
    }
}

async fn register_edge(config: &Config, control: &ControlPlaneClient) -> Result<EdgeIdentity> {
    let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    let ip_address = config
        .advertise_ip
        .clone()
        .or_else(detect_local_ip)
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let request = RegisterRequest {
        region: config.region.clone(),
        ip_address,
        hostname,
        capacity: config.capacity,
    };
    control
        .register(&request)
        .await
        .context("Control-plane registration failed")
}

/// Best-effort local address discovery: `connect` on a UDP socket only
/// selects a route, nothing is sent on the wire.
fn detect_local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Region '{}', control plane at {}.",
        config.region, config.control_plane_url
    );
    match &config.redis_url {
        Some(url) => info!("Cache backend: Redis at {}.", url),
        None => info!(
            "Cache backend: in-memory, budget {} bytes ({:.2} MB).",
            config.cache_size,
            config.cache_size as f64 / 1024.0 / 1024.0
        ),
    }
}
