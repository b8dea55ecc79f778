//! Confirmed transaction ids, for answering `/status` without the chain API.
//!
//! Confirmation is final within the facilitator's answer window, so an id
//! seen on-chain once stays confirmed. Ids are hex and kept lowercased; the
//! oldest unused id is dropped when the cache is full.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Status-lookup counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the chain.
    pub misses: u64,
    /// Ids currently held.
    pub entries: usize,
}

struct Inner {
    ids: LruCache<String, ()>,
    hits: u64,
    misses: u64,
}

/// Bounded set of transaction ids known to be on-chain.
pub struct ConfirmedCache {
    inner: Mutex<Inner>,
}

impl ConfirmedCache {
    /// Cache holding up to `capacity` ids. Zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                ids: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Whether `tx_hash` was recorded, counting the lookup.
    pub fn is_confirmed(&self, tx_hash: &str) -> bool {
        let mut inner = self.inner.lock();
        let found = inner.ids.get(&tx_hash.to_ascii_lowercase()).is_some();
        if found {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Remember `tx_hash` as on-chain.
    pub fn record(&self, tx_hash: &str) {
        self.inner.lock().ids.put(tx_hash.to_ascii_lowercase(), ());
    }

    /// Counters and size.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.ids.len(),
        }
    }
}
