//! Archive response cache.
//!
//! A bounded key→bytes store with 2Q-style eviction: a recent-use queue
//! absorbs one-touch entries, a second touch promotes to the frequent
//! queue, and a ghost list of recently evicted keys lets returning keys
//! skip the probation queue. The bias against single-touch retention
//! matters here because RPC traffic is dominated by unique historical
//! queries that are never repeated.
//!
//! There is no TTL: entries are only ever written for archive-classified
//! requests, and archive data is immutable.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::types::JsonRpcRequest;

/// Default capacity of the process-wide response cache.
pub const RESPONSE_CACHE_SIZE: usize = 20_000;

/// Fraction of capacity dedicated to the recent (probation) queue.
const RECENT_RATIO: f64 = 0.25;
/// Fraction of capacity remembered as ghost entries after eviction.
const GHOST_RATIO: f64 = 0.5;

/// Cache key wire form: the request envelope minus `id`, prefixed with the
/// chain id. Field order is fixed by declaration order, which makes the
/// serialized form canonical.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReqCacheKey<'a> {
    chain_id: u64,
    jsonrpc: &'a str,
    method: &'a str,
    params: &'a [Value],
}

/// Builds the canonical cache key for a request on a chain.
#[must_use]
pub fn cache_key(chain_id: u64, data: &JsonRpcRequest) -> String {
    let key = ReqCacheKey {
        chain_id,
        jsonrpc: &data.jsonrpc,
        method: &data.method,
        params: &data.params,
    };
    // Serialization of a plain struct over JSON values cannot fail.
    serde_json::to_string(&key).unwrap_or_default()
}

struct TwoQueueInner {
    recent: LruCache<String, Bytes>,
    frequent: LruCache<String, Bytes>,
    ghost: LruCache<String, ()>,
}

/// Thread-safe bounded 2Q cache over owned byte bodies.
pub struct ResponseCache {
    inner: Mutex<TwoQueueInner>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(RESPONSE_CACHE_SIZE)
    }
}

impl ResponseCache {
    /// Creates a cache with the given total capacity (recent + frequent).
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`; the split into two queues needs at least
    /// one slot each. The gateway only constructs this with
    /// [`RESPONSE_CACHE_SIZE`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "2Q cache capacity must be at least 2");
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let recent_cap = ((capacity as f64 * RECENT_RATIO) as usize).max(1);
        let frequent_cap = (capacity - recent_cap).max(1);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ghost_cap = ((capacity as f64 * GHOST_RATIO) as usize).max(1);

        Self {
            inner: Mutex::new(TwoQueueInner {
                recent: LruCache::new(NonZeroUsize::new(recent_cap).expect("recent_cap >= 1")),
                frequent: LruCache::new(
                    NonZeroUsize::new(frequent_cap).expect("frequent_cap >= 1"),
                ),
                ghost: LruCache::new(NonZeroUsize::new(ghost_cap).expect("ghost_cap >= 1")),
            }),
        }
    }

    /// Looks up a key. A hit in the recent queue promotes the entry to the
    /// frequent queue.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.frequent.get(key) {
            return Some(value.clone());
        }
        if let Some(value) = inner.recent.pop(key) {
            inner.frequent.push(key.to_string(), value.clone());
            return Some(value);
        }
        None
    }

    /// Inserts a value. Keys seen on the ghost list are admitted straight
    /// to the frequent queue; fresh keys start on probation in the recent
    /// queue. Re-inserting a resident key refreshes it in place, so inserts
    /// are idempotent.
    pub fn put(&self, key: String, value: Bytes) {
        let mut inner = self.inner.lock();
        if inner.frequent.contains(&key) {
            inner.frequent.put(key, value);
            return;
        }
        if inner.recent.contains(&key) {
            inner.recent.pop(&key);
            inner.frequent.push(key, value);
            return;
        }
        if inner.ghost.pop(&key).is_some() {
            inner.frequent.push(key, value);
            return;
        }
        if let Some((evicted, _)) = inner.recent.push(key, value) {
            inner.ghost.put(evicted, ());
        }
    }

    /// Number of resident entries across both queues.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.recent.len() + inner.frequent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
