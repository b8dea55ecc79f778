//! Durable key/value store holding settlement records.
//!
//! The store's atomic `set_if_absent` is the only coordination point between
//! facilitator instances. Values are opaque strings (JSON records).

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Key/value store with TTLs and an atomic claim.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Write `value` only if `key` is absent. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool>;

    /// Write `value` unconditionally.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Read the value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Minimum time between sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    next_sweep: Option<Instant>,
}

impl Entries {
    // Writes drop expired entries, at most once per SWEEP_INTERVAL, so keys
    // that are never read again do not accumulate.
    fn sweep(&mut self, now: Instant) {
        if self.next_sweep.is_some_and(|at| now < at) {
            return;
        }
        self.map.retain(|_, e| e.expires_at > now);
        self.next_sweep = Some(now + SWEEP_INTERVAL);
    }
}

/// Process-local store for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether no live entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.map.get(key).is_some_and(|e| e.expires_at > now) {
            return Ok(false);
        }
        entries.sweep(now);
        entries.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.sweep(now);
        entries.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.map.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
