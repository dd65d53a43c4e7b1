// src/core/cache/key.rs

//! Deterministic cache-key derivation.
//!
//! A key is a pure function of the request method, host, path, raw query, and
//! a fixed, ordered subset of request headers: `Accept` and `Accept-Encoding`
//! select the representation, and `Authorization` keeps per-user responses
//! from crossing sessions. The origin's `Vary` header is not consulted.
//!
//! Format: `method ":" host path ("?" query)?` followed by one
//! `|Header=value` segment per value of each selected header, in the fixed
//! header order and the order values were received. Missing headers
//! contribute nothing. The result is byte-stable across processes.

use axum::http::{HeaderMap, Method};

/// The fixed, ordered header subset that participates in key derivation.
pub const KEY_HEADERS: [&str; 3] = ["Accept", "Accept-Encoding", "Authorization"];

/// Derives the cache key for a request.
pub fn derive_key(
    method: &Method,
    host: &str,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> String {
    let mut key = String::with_capacity(64);
    key.push_str(method.as_str());
    key.push(':');
    key.push_str(host);
    key.push_str(path);
    if let Some(query) = query {
        if !query.is_empty() {
            key.push('?');
            key.push_str(query);
        }
    }
    for name in KEY_HEADERS {
        for value in headers.get_all(name) {
            if let Ok(value) = value.to_str() {
                key.push('|');
                key.push_str(name);
                key.push('=');
                key.push_str(value);
            }
        }
    }
    key
}
