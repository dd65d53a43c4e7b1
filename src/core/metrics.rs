// src/core/metrics.rs

//! Defines and registers Prometheus metrics for edge monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Counters ---
    /// The total number of client requests handled by the proxy listener.
    pub static ref REQUESTS_TOTAL: Counter =
        register_counter!("opaledge_requests_total", "Total number of proxied client requests.").unwrap();
    /// The total number of requests served from the local cache.
    pub static ref CACHE_HITS_TOTAL: Counter =
        register_counter!("opaledge_cache_hits_total", "Total number of cache hits.").unwrap();
    /// The total number of cacheable lookups that had to go to origin.
    pub static ref CACHE_MISSES_TOTAL: Counter =
        register_counter!("opaledge_cache_misses_total", "Total number of cache misses.").unwrap();
    /// The total number of origin fetches that failed (transport, timeout, oversized body).
    pub static ref ORIGIN_ERRORS_TOTAL: Counter =
        register_counter!("opaledge_origin_errors_total", "Total number of failed origin fetches.").unwrap();
    /// The total number of requests refused by the rate limiter.
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("opaledge_rate_limited_total", "Total number of rate-limited requests.").unwrap();

    // --- Histograms ---
    /// A histogram of end-to-end request latencies.
    pub static ref REQUEST_LATENCY_SECONDS: Histogram =
        register_histogram!("opaledge_request_duration_seconds", "Latency of client request handling in seconds.").unwrap();
    /// A histogram of origin fetch latencies (connect through body read).
    pub static ref ORIGIN_LATENCY_SECONDS: Histogram =
        register_histogram!("opaledge_origin_duration_seconds", "Latency of origin fetches in seconds.").unwrap();

    // --- Gauges ---
    /// The current accounted cache size (bytes for the in-memory store, entries for Redis).
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("opaledge_cache_size", "Current accounted cache size (bytes in-memory, entries for Redis).").unwrap();
    /// The number of live token buckets held by the rate limiter.
    pub static ref RATE_LIMIT_BUCKETS: Gauge =
        register_gauge!("opaledge_rate_limit_buckets", "Number of live rate-limiter token buckets.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
