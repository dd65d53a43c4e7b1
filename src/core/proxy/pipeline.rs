// src/core/proxy/pipeline.rs

//! The request-serving pipeline: derive the cache key, try the cache, fall
//! back to an origin fetch, decide cacheability, and store.
//!
//! The origin body is fully buffered before anything is written to the
//! client, so an oversized or truncated body can still surface as a clean
//! `502` and is never cached. Concurrent misses for the same key are not
//! coalesced; each fetches origin and the last `set` wins, which is safe
//! because all writers derive the same TTL class from equivalent responses.

use super::headers;
use crate::core::cache::{CacheEntry, key, policy};
use crate::core::control::DomainConfig;
use crate::core::metrics;
use crate::core::state::EdgeState;
use crate::core::OpalEdgeError;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub const X_CACHE_STATUS: &str = "x-cache-status";
pub const X_CACHE_DATE: &str = "x-cache-date";

/// Serves one admitted request for a resolved domain.
pub async fn serve(
    state: &Arc<EdgeState>,
    domain: &DomainConfig,
    client_ip: &str,
    req: Request,
) -> Result<Response, OpalEdgeError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let cache_key = key::derive_key(&method, &domain.domain, &path, query.as_deref(), req.headers());

    let cacheable_request = policy::request_is_cacheable(&method);
    if cacheable_request {
        match state.cache.get(&cache_key).await {
            Ok(Some(entry)) => {
                state.stats.increment_cache_hits();
                debug!("cache hit for '{}'", cache_key);
                return hit_response(&entry);
            }
            Ok(None) => state.stats.increment_cache_misses(),
            Err(e) => {
                // A broken cache backend degrades to a miss.
                state.stats.increment_cache_misses();
                warn!("cache lookup failed for '{}': {}", cache_key, e);
            }
        }
    }

    let origin_request =
        build_origin_request(state, domain, &method, &path, query.as_deref(), client_ip, req)?;

    let fetch_started = Instant::now();
    let origin_response = origin_request.send().await.map_err(|e| {
        state.stats.increment_origin_errors();
        OpalEdgeError::OriginUnreachable(e.to_string())
    })?;

    let status = origin_response.status();
    let origin_headers = origin_response.headers().clone();
    let body = read_origin_body(state, origin_response).await?;
    metrics::ORIGIN_LATENCY_SECONDS.observe(fetch_started.elapsed().as_secs_f64());

    if cacheable_request && policy::response_is_cacheable(status, &origin_headers) {
        let config = &state.config;
        let ttl = policy::derive_ttl(
            &origin_headers,
            domain.cache_ttl,
            config.default_ttl,
            config.min_cache_age,
            config.max_cache_age,
        );
        let entry = CacheEntry::new(
            status.as_u16(),
            headers::stored_entry_headers(&origin_headers),
            body.clone(),
            ttl,
        );
        // A failed store still returns the already-assembled response; the
        // client simply sees the miss.
        if let Err(e) = state.cache.set(&cache_key, entry).await {
            warn!("failed to store cache entry for '{}': {}", cache_key, e);
        }
    }

    miss_response(status, &origin_headers, body)
}

/// Replays a cached entry, annotated with `X-Cache-Status: HIT` and the
/// storage timestamp.
fn hit_response(entry: &CacheEntry) -> Result<Response, OpalEdgeError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static(X_CACHE_STATUS),
        HeaderValue::from_static("HIT"),
    );
    let cached_at = DateTime::<Utc>::from(entry.cached_at).to_rfc3339();
    headers.insert(
        HeaderName::from_static(X_CACHE_DATE),
        HeaderValue::from_str(&cached_at)
            .map_err(|e| OpalEdgeError::Internal(format!("invalid cache date header: {e}")))?,
    );

    let status = StatusCode::from_u16(entry.status_code)
        .map_err(|_| OpalEdgeError::Internal(format!("invalid cached status {}", entry.status_code)))?;
    let mut response = Response::new(Body::from(entry.body.clone()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Relays the origin response, annotated with `X-Cache-Status: MISS`.
fn miss_response(
    status: StatusCode,
    origin_headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, OpalEdgeError> {
    let mut headers = headers::filter_client_response_headers(origin_headers);
    headers.insert(
        HeaderName::from_static(X_CACHE_STATUS),
        HeaderValue::from_static("MISS"),
    );
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Builds the upstream request: scheme and host from the domain's origin,
/// path and query verbatim from the inbound request, hop-by-hop headers
/// stripped, `Host` stripped then set, and the forwarding headers applied.
/// The inbound body, when present, is streamed through without buffering.
fn build_origin_request(
    state: &Arc<EdgeState>,
    domain: &DomainConfig,
    method: &Method,
    path: &str,
    query: Option<&str>,
    client_ip: &str,
    req: Request,
) -> Result<reqwest::RequestBuilder, OpalEdgeError> {
    let mut url = reqwest::Url::parse(&domain.origin_url).map_err(|e| {
        OpalEdgeError::ControlPlane(format!("invalid origin_url '{}': {e}", domain.origin_url))
    })?;
    url.set_path(path);
    url.set_query(query);

    let inbound_headers = req.headers().clone();
    let mut upstream_headers = headers::filter_upstream_request_headers(&inbound_headers);

    let host = origin_host_value(&url).ok_or_else(|| {
        OpalEdgeError::ControlPlane(format!("origin_url '{}' has no host", domain.origin_url))
    })?;
    upstream_headers.insert(
        header::HOST,
        HeaderValue::from_str(&host)
            .map_err(|e| OpalEdgeError::ControlPlane(format!("invalid origin host '{host}': {e}")))?,
    );
    upstream_headers.insert(
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_str(client_ip)
            .map_err(|e| OpalEdgeError::InvalidRequest(format!("invalid client address: {e}")))?,
    );
    // The edge does not terminate TLS, so the inbound scheme is plain HTTP.
    upstream_headers.insert(
        HeaderName::from_static("x-forwarded-proto"),
        HeaderValue::from_static("http"),
    );

    let mut builder = state
        .origin_client
        .request(method.clone(), url)
        .headers(upstream_headers);
    if request_has_body(&inbound_headers) {
        builder = builder.body(reqwest::Body::wrap_stream(req.into_body().into_data_stream()));
    }
    Ok(builder)
}

fn origin_host_value(url: &reqwest::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn request_has_body(headers: &HeaderMap) -> bool {
    if let Some(length) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
    {
        return length > 0;
    }
    headers.contains_key(header::TRANSFER_ENCODING)
}

/// Reads the origin body with a hard cap. A `Content-Length` above the cap
/// fails before any read; a cap hit mid-read fails as well, so a truncated
/// body is never cached or relayed.
async fn read_origin_body(
    state: &Arc<EdgeState>,
    mut response: reqwest::Response,
) -> Result<Bytes, OpalEdgeError> {
    let max = state.config.max_body_bytes;
    if let Some(length) = response.content_length() {
        if length > max as u64 {
            state.stats.increment_origin_errors();
            return Err(OpalEdgeError::BodyTooLarge {
                length: length as usize,
                max,
            });
        }
    }

    let mut buf = BytesMut::new();
    loop {
        let chunk = response.chunk().await.map_err(|e| {
            state.stats.increment_origin_errors();
            OpalEdgeError::OriginUnreachable(e.to_string())
        })?;
        let Some(chunk) = chunk else { break };
        if buf.len() + chunk.len() > max {
            state.stats.increment_origin_errors();
            return Err(OpalEdgeError::BodyTooLarge {
                length: buf.len() + chunk.len(),
                max,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
