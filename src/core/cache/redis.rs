// src/core/cache/redis.rs

//! The Redis-backed cache backend.
//!
//! Each logical entry is stored as a hash under `opaledge:cache:<key>` with
//! fields `status_code`, `headers` (one `name: value` line per header value),
//! `body`, `cached_at` (unix seconds), and `ttl` (seconds). Expiry is set on
//! the hash itself; reads still re-check staleness against
//! `cached_at + ttl` as a clock-skew safety net.

use super::CacheEntry;
use crate::core::OpalEdgeError;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

const KEY_PREFIX: &str = "opaledge:cache:";

/// A cache backend over a shared Redis connection. The connection manager
/// reconnects on failure and is cheap to clone per operation.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis and returns the backend handle.
    pub async fn connect(url: &str) -> Result<Self, OpalEdgeError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn storage_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Reads and reconstructs the entry, enforcing freshness. A hash that is
    /// missing, stale, or corrupt yields `None`; stale and corrupt hashes are
    /// deleted on the way out.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, OpalEdgeError> {
        let storage_key = Self::storage_key(key);
        let mut conn = self.conn.clone();
        let fields: HashMap<String, Vec<u8>> = conn.hgetall(&storage_key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let entry = match decode_entry(&fields) {
            Some(entry) => entry,
            None => {
                warn!("discarding undecodable cache hash '{}'", storage_key);
                let _: () = conn.del(&storage_key).await?;
                return Ok(None);
            }
        };

        if !entry.is_fresh(SystemTime::now()) {
            let _: () = conn.del(&storage_key).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Writes the entry hash and sets its expiry to the entry TTL.
    pub async fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), OpalEdgeError> {
        let storage_key = Self::storage_key(key);
        let cached_at = entry
            .cached_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        // Redis expiry is whole seconds; round sub-second TTLs up to one.
        let ttl_secs = entry.ttl.as_secs().max(1);

        let header_lines = entry
            .headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");

        let items: Vec<(&str, Vec<u8>)> = vec![
            ("status_code", entry.status_code.to_string().into_bytes()),
            ("headers", header_lines.into_bytes()),
            ("body", entry.body.to_vec()),
            ("cached_at", cached_at.to_string().into_bytes()),
            ("ttl", ttl_secs.to_string().into_bytes()),
        ];

        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(&storage_key, &items).await?;
        let _: () = conn.expire(&storage_key, ttl_secs as i64).await?;
        Ok(())
    }

    /// Deletes the entry hash if present. Idempotent.
    pub async fn delete(&self, key: &str) -> Result<(), OpalEdgeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::storage_key(key)).await?;
        Ok(())
    }

    /// Deletes every entry under the cache prefix.
    pub async fn clear(&self) -> Result<(), OpalEdgeError> {
        let keys = self.scan_keys().await?;
        if !keys.is_empty() {
            let mut conn = self.conn.clone();
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }

    /// Entry count under the cache prefix, via an incremental `SCAN`.
    /// Informational only.
    pub async fn size(&self) -> Result<u64, OpalEdgeError> {
        Ok(self.scan_keys().await?.len() as u64)
    }

    async fn scan_keys(&self) -> Result<Vec<String>, OpalEdgeError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<String> =
            conn.scan_match(format!("{KEY_PREFIX}*")).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}

/// Reconstructs a [`CacheEntry`] from its hash fields. Returns `None` if any
/// required field is missing or unparseable.
fn decode_entry(fields: &HashMap<String, Vec<u8>>) -> Option<CacheEntry> {
    let status_code: u16 = parse_numeric_field(fields, "status_code")?;
    let cached_at_secs: u64 = parse_numeric_field(fields, "cached_at")?;
    let ttl_secs: u64 = parse_numeric_field(fields, "ttl")?;
    let body = Bytes::from(fields.get("body").cloned().unwrap_or_default());

    let mut headers = Vec::new();
    if let Some(raw) = fields.get("headers") {
        let raw = String::from_utf8(raw.clone()).ok()?;
        for line in raw.lines().filter(|line| !line.is_empty()) {
            let (name, value) = line.split_once(": ")?;
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Some(CacheEntry {
        status_code,
        headers,
        body,
        cached_at: UNIX_EPOCH + Duration::from_secs(cached_at_secs),
        ttl: Duration::from_secs(ttl_secs),
    })
}

fn parse_numeric_field<T: std::str::FromStr>(
    fields: &HashMap<String, Vec<u8>>,
    name: &str,
) -> Option<T> {
    std::str::from_utf8(fields.get(name)?).ok()?.trim().parse().ok()
}
