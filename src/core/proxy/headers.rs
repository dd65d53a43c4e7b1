// src/core/proxy/headers.rs

//! Header filtering for the proxy pipeline.
//!
//! Hop-by-hop headers apply to a single transport hop and are stripped from
//! both directions. Stored cache entries additionally drop headers that are
//! irrelevant or misleading at replay.

use axum::http::{HeaderMap, HeaderName, header};

/// Hop-by-hop header names, never forwarded in either direction.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Headers excluded from stored cache entries on top of the hop-by-hop set.
pub const UNCACHED_RESPONSE_HEADERS: [&str; 5] = [
    "set-cookie",
    "authorization",
    "proxy-authorization",
    "date",
    "server",
];

/// `HeaderName` is always lowercase, so a direct slice lookup suffices.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copies inbound headers for the upstream request. Hop-by-hop headers are
/// dropped; `Host` is dropped here and re-set from the origin by the caller;
/// `Content-Length` is dropped because the upstream client re-frames the
/// forwarded body itself.
pub fn filter_upstream_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Copies origin headers for the client response, dropping the hop-by-hop set.
pub fn filter_client_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Produces the header list persisted with a cache entry: origin headers
/// minus the hop-by-hop set and [`UNCACHED_RESPONSE_HEADERS`]. Values that
/// are not valid UTF-8 are skipped.
pub fn stored_entry_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name) && !UNCACHED_RESPONSE_HEADERS.contains(&name.as_str())
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
