// src/core/state.rs

//! Defines the central `EdgeState` struct shared by all request handlers and
//! background tasks.

use crate::config::Config;
use crate::core::OpalEdgeError;
use crate::core::cache::CacheStore;
use crate::core::control::{ControlPlaneClient, EdgeIdentity};
use crate::core::metrics;
use crate::core::rate_limit::RateLimiter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide request statistics, mirrored into the Prometheus registry.
#[derive(Debug, Default)]
pub struct EdgeStats {
    requests_handled: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    origin_errors: AtomicU64,
    rate_limited: AtomicU64,
}

impl EdgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_requests_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
        metrics::REQUESTS_TOTAL.inc();
    }

    pub fn get_requests_handled(&self) -> u64 {
        self.requests_handled.load(Ordering::Relaxed)
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::CACHE_HITS_TOTAL.inc();
    }

    pub fn get_cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        metrics::CACHE_MISSES_TOTAL.inc();
    }

    pub fn get_cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn increment_origin_errors(&self) {
        self.origin_errors.fetch_add(1, Ordering::Relaxed);
        metrics::ORIGIN_ERRORS_TOTAL.inc();
    }

    pub fn get_origin_errors(&self) -> u64 {
        self.origin_errors.load(Ordering::Relaxed)
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        metrics::RATE_LIMITED_TOTAL.inc();
    }

    pub fn get_rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }
}

/// The single process-wide handle. Constructed once during initialization,
/// then shared read-only behind an `Arc` by every request handler and
/// background task; there is no lazy global construction.
pub struct EdgeState {
    pub config: Config,
    pub cache: CacheStore,
    pub limiter: RateLimiter,
    pub control: ControlPlaneClient,
    /// Shared upstream client with a bounded idle-connection pool; never
    /// create a fresh client per request.
    pub origin_client: reqwest::Client,
    pub identity: EdgeIdentity,
    pub stats: EdgeStats,
}

impl EdgeState {
    /// Builds the shared origin HTTP client with the configured timeouts and
    /// pool limits.
    pub fn build_origin_client(config: &Config) -> Result<reqwest::Client, OpalEdgeError> {
        reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.response_timeout())
            .pool_max_idle_per_host(config.max_idle_conns_per_host)
            .pool_idle_timeout(config.idle_conn_timeout())
            .build()
            .map_err(OpalEdgeError::from)
    }
}
