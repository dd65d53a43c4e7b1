// src/core/cache/policy.rs

//! The cacheability policy: which exchanges may be cached, and for how long.

use axum::http::{HeaderMap, Method, StatusCode, header};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Only `GET` and `HEAD` requests are ever cached.
pub fn request_is_cacheable(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// A response is cacheable only if its status is 2xx, it sets no cookie, and
/// `Cache-Control` carries none of `private`, `no-cache`, `no-store`
/// (case-insensitive).
pub fn response_is_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    if !status.is_success() {
        return false;
    }
    if headers.contains_key(header::SET_COOKIE) {
        return false;
    }
    for value in headers.get_all(header::CACHE_CONTROL) {
        if let Ok(value) = value.to_str() {
            let value = value.to_ascii_lowercase();
            if value.contains("private")
                || value.contains("no-cache")
                || value.contains("no-store")
            {
                return false;
            }
        }
    }
    true
}

/// Derives the effective TTL for a cacheable response. First match wins:
/// `Cache-Control: max-age=N`, then a future `Expires`, then the domain's
/// configured TTL, then `default_ttl`. The result is clamped to
/// `[min_cache_age, max_cache_age]`.
pub fn derive_ttl(
    headers: &HeaderMap,
    domain_cache_ttl: u64,
    default_ttl: u64,
    min_cache_age: u64,
    max_cache_age: u64,
) -> Duration {
    let ttl = ttl_from_cache_control(headers)
        .or_else(|| ttl_from_expires(headers))
        .or_else(|| (domain_cache_ttl > 0).then(|| Duration::from_secs(domain_cache_ttl)))
        .unwrap_or_else(|| Duration::from_secs(default_ttl));

    ttl.clamp(
        Duration::from_secs(min_cache_age),
        Duration::from_secs(max_cache_age),
    )
}

/// Extracts `max-age=N` from any `Cache-Control` value. An unparseable
/// directive is treated as absent.
fn ttl_from_cache_control(headers: &HeaderMap) -> Option<Duration> {
    for value in headers.get_all(header::CACHE_CONTROL) {
        let Ok(value) = value.to_str() else { continue };
        for directive in value.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            if let Some(seconds) = directive.strip_prefix("max-age=") {
                if let Ok(seconds) = seconds.trim().parse::<u64>() {
                    return Some(Duration::from_secs(seconds));
                }
            }
        }
    }
    None
}

/// Extracts a TTL from a future `Expires` date. A past or malformed date
/// yields `None` so derivation falls through to the next source.
fn ttl_from_expires(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(header::EXPIRES)?.to_str().ok()?;
    let expires = DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = expires.with_timezone(&Utc) - Utc::now();
    let seconds = remaining.num_seconds();
    if seconds > 0 {
        Some(Duration::from_secs(seconds as u64))
    } else {
        None
    }
}
