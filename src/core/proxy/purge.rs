// src/core/proxy/purge.rs

//! Cache purging.
//!
//! Purging deletes the keys a path could have been stored under. Because key
//! derivation folds in `Accept` and `Accept-Encoding`, each path is expanded
//! into a fixed cross-product of the header values clients commonly send.
//! Paths are treated literally; there is no prefix or wildcard matching.

use crate::core::OpalEdgeError;
use crate::core::cache::key;
use crate::core::state::EdgeState;
use axum::http::{HeaderMap, HeaderValue, Method, header};
use tracing::{debug, warn};

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// The `Accept` values expanded per purged path.
pub const PURGE_ACCEPT_VARIANTS: [Option<&str>; 4] = [
    None,
    Some("*/*"),
    Some(BROWSER_ACCEPT),
    Some("application/json"),
];

/// The `Accept-Encoding` values expanded per purged path.
pub const PURGE_ENCODING_VARIANTS: [Option<&str>; 2] = [None, Some("gzip")];

/// Removes the cache entries for each listed path on `domain`, across the
/// header-variant cross-product. Deleting an absent key is a no-op, so purges
/// are idempotent and redelivery is safe. Individual deletion failures are
/// logged and the batch continues; the error is reported at the end so the
/// purge task is retried rather than acknowledged.
pub async fn purge(
    state: &EdgeState,
    domain: &str,
    paths: &[String],
) -> Result<(), OpalEdgeError> {
    let mut failures = 0usize;
    for path in paths {
        for accept in PURGE_ACCEPT_VARIANTS {
            for encoding in PURGE_ENCODING_VARIANTS {
                let mut headers = HeaderMap::new();
                if let Some(accept) = accept {
                    headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
                }
                if let Some(encoding) = encoding {
                    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(encoding));
                }
                let cache_key = key::derive_key(&Method::GET, domain, path, None, &headers);
                if let Err(e) = state.cache.delete(&cache_key).await {
                    failures += 1;
                    warn!("purge: failed to delete '{}': {}", cache_key, e);
                }
            }
        }
        debug!("purged path '{}' for domain '{}'", path, domain);
    }
    if failures > 0 {
        return Err(OpalEdgeError::CacheBackend(format!(
            "{failures} purge deletions failed for domain '{domain}'"
        )));
    }
    Ok(())
}
