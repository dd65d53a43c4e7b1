// src/core/cache/memory.rs

//! The process-local in-memory cache backend.
//!
//! A single read-write lock guards the entry map and the size counter. Reads
//! take the read lock; a stale hit upgrades to the write lock to prune the
//! entry before reporting "not found". When an insert would exceed the size
//! budget, the entry with the oldest `cached_at` is evicted repeatedly until
//! the new entry fits. This is oldest-insertion eviction, not LRU: reads do
//! not refresh `cached_at`. Ties break on key order, which keeps eviction
//! deterministic.

use super::CacheEntry;
use crate::core::OpalEdgeError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, CacheEntry>,
    current_size: usize,
}

/// An in-memory cache bounded by an accounted byte budget.
#[derive(Debug)]
pub struct MemoryCache {
    max_size_bytes: usize,
    max_body_bytes: usize,
    inner: RwLock<MemoryInner>,
    evictions: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_size_bytes: usize, max_body_bytes: usize) -> Self {
        Self {
            max_size_bytes,
            max_body_bytes,
            inner: RwLock::new(MemoryInner::default()),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns a fresh entry, or `None`. A stale entry is removed before
    /// returning (lazy expiry), so freshness holds at the moment of return.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = SystemTime::now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                Some(entry) if entry.is_fresh(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Stale hit: re-acquire as writer and re-check, since the entry may
        // have been replaced between the two lock acquisitions.
        let mut inner = self.inner.write();
        match inner.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => return Some(entry.clone()),
            None => return None,
            Some(_) => {}
        }
        if let Some(stale) = inner.entries.remove(key) {
            inner.current_size -= stale.approximate_size();
        }
        None
    }

    /// Inserts or replaces `key`, evicting oldest-insertion entries first so
    /// the accounted size never exceeds the budget. An entry that cannot fit
    /// even in an empty store is rejected.
    pub fn set(&self, key: &str, entry: CacheEntry) -> Result<(), OpalEdgeError> {
        if entry.body.len() > self.max_body_bytes {
            return Err(OpalEdgeError::BodyTooLarge {
                length: entry.body.len(),
                max: self.max_body_bytes,
            });
        }
        let incoming = entry.approximate_size();
        if incoming > self.max_size_bytes {
            return Err(OpalEdgeError::BodyTooLarge {
                length: incoming,
                max: self.max_size_bytes,
            });
        }

        let mut inner = self.inner.write();

        if let Some(previous) = inner.entries.remove(key) {
            inner.current_size -= previous.approximate_size();
        }

        while inner.current_size + incoming > self.max_size_bytes && !inner.entries.is_empty() {
            let oldest = inner
                .entries
                .iter()
                .min_by(|(ka, ea), (kb, eb)| {
                    ea.cached_at.cmp(&eb.cached_at).then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone());
            if let Some(victim) = oldest {
                if let Some(evicted) = inner.entries.remove(&victim) {
                    inner.current_size -= evicted.approximate_size();
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("evicted cache entry '{}' to make room", victim);
                }
            }
        }

        inner.current_size += incoming;
        inner.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Removes `key` if present. Idempotent.
    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.entries.remove(key) {
            inner.current_size -= entry.approximate_size();
        }
    }

    /// Removes all entries and resets the size counter.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.current_size = 0;
    }

    /// Current accounted size in bytes.
    pub fn size(&self) -> usize {
        self.inner.read().current_size
    }

    /// Number of live entries (expired-but-unread entries included).
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of entries evicted to make room since startup.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
