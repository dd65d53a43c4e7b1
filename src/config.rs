// src/config.rs

//! Manages edge configuration: loading, resolving dynamic values, and validation.
//!
//! Configuration is layered: a TOML file first, then the process environment,
//! with the environment winning. Keys map to environment variables one-to-one
//! (e.g. `metrics_port` is read from `METRICS_PORT`).

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum CacheSizeConfig {
    Bytes(usize),
    String(String),
}

/// A raw representation of the config sources before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_region")]
    region: String,
    #[serde(default = "default_control_plane_url")]
    control_plane_url: String,
    #[serde(default)]
    redis_url: Option<String>,
    #[serde(default = "default_cache_size_config")]
    cache_size: CacheSizeConfig,
    #[serde(default = "default_default_ttl")]
    default_ttl: u64,
    #[serde(default)]
    min_cache_age: u64,
    #[serde(default = "default_max_cache_age")]
    max_cache_age: u64,
    #[serde(default = "default_max_body_bytes")]
    max_body_bytes: usize,
    #[serde(default = "default_rate_limit_rps")]
    rate_limit_rps: u64,
    #[serde(default = "default_rate_limit_burst")]
    rate_limit_burst: u64,
    #[serde(default = "default_capacity")]
    capacity: u64,
    #[serde(default)]
    advertise_ip: Option<String>,
    #[serde(default = "default_health_check_interval")]
    health_check_interval: u64,
    #[serde(default = "default_health_check_timeout")]
    health_check_timeout: u64,
    #[serde(default = "default_purge_poll_interval")]
    purge_poll_interval: u64,
    #[serde(default = "default_connect_timeout")]
    connect_timeout: u64,
    #[serde(default = "default_response_timeout")]
    response_timeout: u64,
    #[serde(default = "default_max_idle_conns_per_host")]
    max_idle_conns_per_host: usize,
    #[serde(default = "default_idle_conn_timeout")]
    idle_conn_timeout: u64,
    // TLS termination is handled in front of the edge; these keys are accepted
    // so shared deployment manifests do not fail, but they are ignored.
    #[serde(default)]
    tls_enabled: bool,
    #[serde(default)]
    tls_cert_path: Option<String>,
    #[serde(default)]
    tls_key_path: Option<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_region() -> String {
    "dev".to_string()
}
fn default_control_plane_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_cache_size_config() -> CacheSizeConfig {
    CacheSizeConfig::String("100MB".to_string())
}
fn default_default_ttl() -> u64 {
    3600
}
fn default_max_cache_age() -> u64 {
    86400 // 24 hours
}
fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024 // 10 MB
}
fn default_rate_limit_rps() -> u64 {
    100
}
fn default_rate_limit_burst() -> u64 {
    200
}
fn default_capacity() -> u64 {
    1000
}
fn default_health_check_interval() -> u64 {
    30
}
fn default_health_check_timeout() -> u64 {
    10
}
fn default_purge_poll_interval() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_response_timeout() -> u64 {
    30
}
fn default_max_idle_conns_per_host() -> usize {
    10
}
fn default_idle_conn_timeout() -> u64 {
    90
}

/// Represents the final, validated, and resolved edge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub metrics_port: u16,
    pub log_level: String,
    pub region: String,
    pub control_plane_url: String,
    /// Redis connection URL. Empty or unset selects the in-memory cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// The cache size budget in bytes, resolved from the `cache_size` key.
    pub cache_size: usize,
    pub default_ttl: u64,
    pub min_cache_age: u64,
    pub max_cache_age: u64,
    pub max_body_bytes: usize,
    pub rate_limit_rps: u64,
    pub rate_limit_burst: u64,
    pub capacity: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_ip: Option<String>,
    pub health_check_interval: u64,
    pub health_check_timeout: u64,
    pub purge_poll_interval: u64,
    pub connect_timeout: u64,
    pub response_timeout: u64,
    pub max_idle_conns_per_host: usize,
    pub idle_conn_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
            region: default_region(),
            control_plane_url: default_control_plane_url(),
            redis_url: None,
            cache_size: 100 * 1024 * 1024,
            default_ttl: default_default_ttl(),
            min_cache_age: 0,
            max_cache_age: default_max_cache_age(),
            max_body_bytes: default_max_body_bytes(),
            rate_limit_rps: default_rate_limit_rps(),
            rate_limit_burst: default_rate_limit_burst(),
            capacity: default_capacity(),
            advertise_ip: None,
            health_check_interval: default_health_check_interval(),
            health_check_timeout: default_health_check_timeout(),
            purge_poll_interval: default_purge_poll_interval(),
            connect_timeout: default_connect_timeout(),
            response_timeout: default_response_timeout(),
            max_idle_conns_per_host: default_max_idle_conns_per_host(),
            idle_conn_timeout: default_idle_conn_timeout(),
        }
    }
}

impl Config {
    /// Creates a new `Config` by layering a TOML file (if present) under the
    /// process environment, then resolving and validating the result.
    pub fn load(path: &str) -> Result<Self> {
        let raw: RawConfig = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::default())
            .build()
            .with_context(|| format!("Failed to read configuration from '{path}'"))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration from '{path}'"))?;

        let cache_size = resolve_cache_size(raw.cache_size)?;

        if raw.tls_enabled || raw.tls_cert_path.is_some() || raw.tls_key_path.is_some() {
            warn!(
                "TLS termination is not handled by the edge proxy; tls_* settings are ignored."
            );
        }

        let config = Config {
            port: raw.port,
            metrics_port: raw.metrics_port,
            log_level: raw.log_level,
            region: raw.region,
            control_plane_url: raw.control_plane_url.trim_end_matches('/').to_string(),
            redis_url: raw.redis_url.filter(|url| !url.trim().is_empty()),
            cache_size,
            default_ttl: raw.default_ttl,
            min_cache_age: raw.min_cache_age,
            max_cache_age: raw.max_cache_age,
            max_body_bytes: raw.max_body_bytes,
            rate_limit_rps: raw.rate_limit_rps,
            rate_limit_burst: raw.rate_limit_burst,
            capacity: raw.capacity,
            advertise_ip: raw.advertise_ip,
            health_check_interval: raw.health_check_interval,
            health_check_timeout: raw.health_check_timeout,
            purge_poll_interval: raw.purge_poll_interval,
            connect_timeout: raw.connect_timeout,
            response_timeout: raw.response_timeout,
            max_idle_conns_per_host: raw.max_idle_conns_per_host,
            idle_conn_timeout: raw.idle_conn_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.metrics_port == 0 {
            return Err(anyhow!("metrics_port cannot be 0"));
        }
        if self.metrics_port == self.port {
            return Err(anyhow!(
                "metrics_port cannot be the same as the main proxy port"
            ));
        }
        if self.control_plane_url.trim().is_empty() {
            return Err(anyhow!("control_plane_url cannot be empty"));
        }
        reqwest::Url::parse(&self.control_plane_url)
            .map_err(|e| anyhow!("invalid control_plane_url '{}': {e}", self.control_plane_url))?;
        if self.cache_size == 0 {
            return Err(anyhow!("cache_size cannot be 0"));
        }
        if self.cache_size < 1024 * 1024 {
            warn!(
                "low cache_size setting: {} bytes. Eviction will be frequent.",
                self.cache_size
            );
        }
        if self.min_cache_age > self.max_cache_age {
            return Err(anyhow!(
                "min_cache_age ({}) cannot exceed max_cache_age ({})",
                self.min_cache_age,
                self.max_cache_age
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes cannot be 0"));
        }
        if self.rate_limit_rps == 0 {
            return Err(anyhow!("rate_limit_rps cannot be 0"));
        }
        if self.rate_limit_burst == 0 {
            return Err(anyhow!("rate_limit_burst cannot be 0"));
        }
        if self.response_timeout == 0 {
            return Err(anyhow!("response_timeout cannot be 0"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout)
    }

    pub fn idle_conn_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_conn_timeout)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    /// The per-call timeout applied to every control-plane request.
    pub fn control_plane_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout)
    }

    pub fn purge_poll_interval(&self) -> Duration {
        Duration::from_secs(self.purge_poll_interval)
    }
}

/// Resolves the `cache_size` key into bytes. Accepts a plain byte count or a
/// string with a `kb`, `mb`, or `gb` suffix (case-insensitive).
fn resolve_cache_size(cfg: CacheSizeConfig) -> Result<usize> {
    match cfg {
        CacheSizeConfig::Bytes(b) => Ok(b),
        CacheSizeConfig::String(s) => {
            let s_lower = s.trim().to_lowercase();
            if let Some(val_str) = s_lower.strip_suffix("gb") {
                parse_size_string(&s, val_str, 1024 * 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("mb") {
                parse_size_string(&s, val_str, 1024 * 1024)
            } else if let Some(val_str) = s_lower.strip_suffix("kb") {
                parse_size_string(&s, val_str, 1024)
            } else {
                let bytes: usize = s_lower.parse().with_context(|| {
                    format!(
                        "Invalid cache_size value '{s}'. Must be a number (bytes) or have a unit (e.g., '100MB')."
                    )
                })?;
                Ok(bytes)
            }
        }
    }
}

/// Parses a string number with a unit suffix and applies a multiplier.
fn parse_size_string(original_str: &str, value_str: &str, multiplier: u64) -> Result<usize> {
    let value: u64 = value_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in cache_size config: '{original_str}'"))?;
    let result_u64 = value.saturating_mul(multiplier);
    if result_u64 > (usize::MAX as u64) {
        return Err(anyhow!(
            "cache_size value '{}' is too large for this system's architecture",
            original_str
        ));
    }
    Ok(result_u64 as usize)
}
