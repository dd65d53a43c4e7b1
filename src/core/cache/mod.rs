// src/core/cache/mod.rs

//! The cache engine: the entry representation and the pluggable store.
//!
//! Two backends exist behind one capability set (`get`, `set`, `delete`,
//! `clear`, `size`): a process-local in-memory store and a Redis-backed
//! store. Callers only ever see [`CacheStore`]; backend-specific types never
//! escape this module.

pub mod key;
pub mod memory;
pub mod policy;
pub mod redis;

use crate::core::OpalEdgeError;
use bytes::Bytes;
use std::time::{Duration, SystemTime};

/// Fixed per-entry accounting overhead, on top of body and header bytes.
pub const ENTRY_OVERHEAD: usize = 64;

/// A single cached HTTP response, the unit stored by the cache engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The origin's HTTP status code.
    pub status_code: u16,
    /// Stored response headers, order-preserving and multi-valued.
    pub headers: Vec<(String, String)>,
    /// The response body.
    pub body: Bytes,
    /// When the entry was stored.
    pub cached_at: SystemTime,
    /// The entry is fresh while `now - cached_at < ttl`.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(status_code: u16, headers: Vec<(String, String)>, body: Bytes, ttl: Duration) -> Self {
        Self {
            status_code,
            headers,
            body,
            cached_at: SystemTime::now(),
            ttl,
        }
    }

    /// Returns `true` while the entry's age is strictly below its TTL.
    /// A `cached_at` in the future (clock adjustment) counts as fresh.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        match now.duration_since(self.cached_at) {
            Ok(age) => age < self.ttl,
            Err(_) => true,
        }
    }

    /// The accounted size of the entry: body bytes plus header name/value
    /// bytes plus [`ENTRY_OVERHEAD`].
    pub fn approximate_size(&self) -> usize {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.len() + value.len())
            .sum();
        self.body.len() + header_bytes + ENTRY_OVERHEAD
    }
}

/// The pluggable cache store. Constructed once at startup and shared behind
/// the process-wide state handle.
pub enum CacheStore {
    Memory(memory::MemoryCache),
    Redis(redis::RedisCache),
}

impl CacheStore {
    /// Returns the entry for `key` if it is present and fresh. A stale entry
    /// is removed before reporting "not found" (lazy expiry).
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, OpalEdgeError> {
        match self {
            CacheStore::Memory(store) => Ok(store.get(key)),
            CacheStore::Redis(store) => store.get(key).await,
        }
    }

    /// Inserts or replaces the entry for `key`, evicting as needed so the
    /// store stays within its size budget.
    pub async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), OpalEdgeError> {
        match self {
            CacheStore::Memory(store) => store.set(key, entry),
            CacheStore::Redis(store) => store.set(key, &entry).await,
        }
    }

    /// Removes the entry for `key` if present. Idempotent.
    pub async fn delete(&self, key: &str) -> Result<(), OpalEdgeError> {
        match self {
            CacheStore::Memory(store) => {
                store.delete(key);
                Ok(())
            }
            CacheStore::Redis(store) => store.delete(key).await,
        }
    }

    /// Removes all entries.
    pub async fn clear(&self) -> Result<(), OpalEdgeError> {
        match self {
            CacheStore::Memory(store) => {
                store.clear();
                Ok(())
            }
            CacheStore::Redis(store) => store.clear().await,
        }
    }

    /// Current accounted size: bytes for the in-memory store, entry count for
    /// Redis (informational only).
    pub async fn size(&self) -> u64 {
        match self {
            CacheStore::Memory(store) => store.size() as u64,
            CacheStore::Redis(store) => store.size().await.unwrap_or(0),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            CacheStore::Memory(_) => "memory",
            CacheStore::Redis(_) => "redis",
        }
    }
}
