// src/core/control.rs

//! The control-plane client: registration, heartbeat, domain resolution, and
//! the purge pull/acknowledge pair.
//!
//! All calls are JSON over HTTP with one shared per-call timeout. A non-2xx
//! status or an undecodable body is an error. Domain resolution keeps a
//! short-TTL local snapshot so the steady-state request path stays off the
//! control plane.

use crate::core::OpalEdgeError;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// The local domain snapshot never outlives this, whatever the domain's TTL.
const DOMAIN_CACHE_CEILING: Duration = Duration::from_secs(60);

/// Per-domain configuration as served by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub id: String,
    pub domain: String,
    pub origin_url: String,
    /// Fallback TTL in seconds when the origin response carries no directive.
    #[serde(default)]
    pub cache_ttl: u64,
    /// Requests/second hint. The edge currently applies one process-wide
    /// limit; this field is carried for the heartbeat and future use.
    #[serde(default)]
    pub rate_limit: u64,
    #[serde(default = "default_domain_status")]
    pub status: String,
}

fn default_domain_status() -> String {
    "active".to_string()
}

impl DomainConfig {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// The identity assigned by the control plane at registration. Held in memory
/// for the process lifetime and used as the implicit subject of heartbeat and
/// purge calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeIdentity {
    pub id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
}

/// One purge instruction pulled from the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeTask {
    pub id: String,
    pub domain_id: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub region: String,
    pub ip_address: String,
    pub hostname: String,
    pub capacity: u64,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    status: &'a str,
    metrics: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PendingPurgesResponse {
    #[serde(default)]
    purges: Vec<PurgeTask>,
}

struct CachedDomain {
    config: Arc<DomainConfig>,
    fetched_at: Instant,
}

/// HTTP client for the control plane.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    domains: DashMap<String, CachedDomain>,
}

impl ControlPlaneClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OpalEdgeError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            domains: DashMap::new(),
        })
    }

    /// Registers this edge. Called once at boot; a failure here is fatal to
    /// startup.
    pub async fn register(&self, request: &RegisterRequest) -> Result<EdgeIdentity, OpalEdgeError> {
        let url = format!("{}/api/v1/edges", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| OpalEdgeError::ControlPlane(format!("register failed: {e}")))?;
        if !response.status().is_success() {
            return Err(OpalEdgeError::ControlPlane(format!(
                "register failed with status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| OpalEdgeError::ControlPlane(format!("register response did not decode: {e}")))
    }

    /// Reports liveness and a small metrics map. Failures are the caller's to
    /// log; the edge keeps serving either way.
    pub async fn heartbeat(
        &self,
        edge_id: &str,
        status: &str,
        metrics: serde_json::Value,
    ) -> Result<(), OpalEdgeError> {
        let url = format!("{}/api/v1/edges/{edge_id}/heartbeat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&HeartbeatRequest { status, metrics })
            .send()
            .await
            .map_err(|e| OpalEdgeError::ControlPlane(format!("heartbeat failed: {e}")))?;
        if !response.status().is_success() {
            return Err(OpalEdgeError::ControlPlane(format!(
                "heartbeat failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Resolves a hostname to its domain configuration, serving from the
    /// local snapshot when it is within TTL. Any failure to obtain a config
    /// is conservatively surfaced as "domain not configured": the edge does
    /// not serve traffic for domains it cannot verify.
    pub async fn resolve_domain(&self, host: &str) -> Result<Arc<DomainConfig>, OpalEdgeError> {
        if let Some(cached) = self.domains.get(host) {
            if cached.fetched_at.elapsed() <= domain_snapshot_ttl(&cached.config) {
                return Ok(cached.config.clone());
            }
        }

        let url = format!("{}/v1/domains/{host}", self.base_url);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("domain resolve for '{}' failed: {}", host, e);
                return Err(OpalEdgeError::DomainNotConfigured(host.to_string()));
            }
        };
        if response.status() == StatusCode::NOT_FOUND {
            self.domains.remove(host);
            return Err(OpalEdgeError::DomainNotConfigured(host.to_string()));
        }
        if !response.status().is_success() {
            warn!(
                "domain resolve for '{}' returned status {}",
                host,
                response.status()
            );
            return Err(OpalEdgeError::DomainNotConfigured(host.to_string()));
        }

        let config: DomainConfig = match response.json().await {
            Ok(config) => config,
            Err(e) => {
                warn!("domain resolve for '{}' did not decode: {}", host, e);
                return Err(OpalEdgeError::DomainNotConfigured(host.to_string()));
            }
        };

        let config = Arc::new(config);
        self.domains.insert(
            host.to_string(),
            CachedDomain {
                config: config.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(config)
    }

    /// Resolves a domain by its opaque id. Used by the purge worker to map
    /// tasks to hostnames; no local caching.
    pub async fn resolve_domain_by_id(&self, domain_id: &str) -> Result<DomainConfig, OpalEdgeError> {
        let url = format!("{}/v1/domains/id/{domain_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OpalEdgeError::ControlPlane(format!("domain lookup failed: {e}")))?;
        if !response.status().is_success() {
            return Err(OpalEdgeError::ControlPlane(format!(
                "domain lookup for id '{domain_id}' failed with status {}",
                response.status()
            )));
        }
        response.json().await.map_err(|e| {
            OpalEdgeError::ControlPlane(format!("domain lookup response did not decode: {e}"))
        })
    }

    /// Pulls the purge tasks pending for this edge.
    pub async fn pending_purges(&self, edge_id: &str) -> Result<Vec<PurgeTask>, OpalEdgeError> {
        let url = format!("{}/api/v1/edges/{edge_id}/purges", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OpalEdgeError::ControlPlane(format!("purge pull failed: {e}")))?;
        if !response.status().is_success() {
            return Err(OpalEdgeError::ControlPlane(format!(
                "purge pull failed with status {}",
                response.status()
            )));
        }
        let decoded: PendingPurgesResponse = response.json().await.map_err(|e| {
            OpalEdgeError::ControlPlane(format!("purge pull response did not decode: {e}"))
        })?;
        Ok(decoded.purges)
    }

    /// Acknowledges a successfully applied purge.
    pub async fn complete_purge(&self, edge_id: &str, purge_id: &str) -> Result<(), OpalEdgeError> {
        let url = format!(
            "{}/api/v1/edges/{edge_id}/purges/{purge_id}/complete",
            self.base_url
        );
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| OpalEdgeError::ControlPlane(format!("purge completion failed: {e}")))?;
        if !response.status().is_success() {
            return Err(OpalEdgeError::ControlPlane(format!(
                "purge completion failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// How long a resolved domain snapshot may be served locally: the domain's
/// own TTL, floored at one second and capped by [`DOMAIN_CACHE_CEILING`].
fn domain_snapshot_ttl(config: &DomainConfig) -> Duration {
    Duration::from_secs(config.cache_ttl.max(1)).min(DOMAIN_CACHE_CEILING)
}
