// src/core/rate_limit.rs

//! Token-bucket rate limiting keyed by `host ":" client_ip`.
//!
//! The outer bucket map is guarded by a mutex only long enough to fetch or
//! insert a bucket; each bucket carries its own lock, so token accounting for
//! distinct clients never contends. Admission is non-blocking: a request is
//! either granted a token immediately or refused.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket. Refill happens lazily on access.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(burst: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills by elapsed time, then consumes one token if available.
    fn try_acquire(&self, rps: f64, burst: f64) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rps).min(burst);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// A bucket that has refilled back to a full burst has seen no traffic
    /// for at least `burst / rps` seconds and can be dropped.
    fn is_idle(&self, rps: f64, burst: f64) -> bool {
        let state = self.state.lock();
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * rps) >= burst
    }
}

/// Process-wide rate limiter over per-(domain, client) token buckets.
#[derive(Debug)]
pub struct RateLimiter {
    rps: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(rps: u64, burst: u64) -> Self {
        Self {
            rps: rps as f64,
            burst: burst as f64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or refuses a request for `key`, creating the bucket on first
    /// sight. Non-blocking.
    pub fn allow(&self, key: &str) -> bool {
        let bucket = {
            let mut buckets = self.buckets.lock();
            buckets
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokenBucket::new(self.burst)))
                .clone()
        };
        bucket.try_acquire(self.rps, self.burst)
    }

    /// Drops buckets that have refilled to a full burst. Returns the number
    /// removed.
    pub fn compact(&self) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_idle(self.rps, self.burst));
        before - buckets.len()
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}
