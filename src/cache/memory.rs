//! In-memory distributed cache.
//!
//! Entries, TTLs and key locks live behind a single lock so `apply` is
//! atomic with respect to readers. Time is read from `tokio::time` so tests
//! can drive expiry with a paused clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{CacheEntry, CacheWrite, DistributedCache, Result};

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(entry: CacheEntry) -> Self {
        let expires_at = entry.ttl.map(|ttl| Instant::now() + ttl);
        Self { entry, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

struct KeyLock {
    owner: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, StoredEntry>,
    locks: HashMap<String, KeyLock>,
}

/// Process-local cache with TTL expiry and per-key transaction locks.
#[derive(Default)]
pub struct InMemoryCache {
    state: RwLock<State>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.read().await;
        state.entries.values().filter(|s| s.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Owner of the unexpired lock on `key`, if any.
    pub async fn lock_owner(&self, key: &str) -> Option<Uuid> {
        let now = Instant::now();
        let state = self.state.read().await;
        state
            .locks
            .get(key)
            .filter(|lock| now < lock.expires_at)
            .map(|lock| lock.owner)
    }
}

#[async_trait]
impl DistributedCache for InMemoryCache {
    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .entries
            .insert(entry.key.clone(), StoredEntry::new(entry));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Instant::now();
        let mut state = self.state.write().await;

        let expired = state
            .entries
            .get(key)
            .is_some_and(|stored| !stored.is_live(now));
        if expired {
            state.entries.remove(key);
            debug!(key, "Evicted expired entry");
            return Ok(None);
        }

        Ok(state.entries.get(key).map(|stored| stored.entry.clone()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.state.write().await.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        // Locks belong to in-flight transactions and lapse on their own.
        self.state.write().await.entries.clear();
        Ok(())
    }

    async fn try_lock(&self, keys: &[String], owner: Uuid, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.write().await;

        let contended = keys.iter().any(|key| {
            state
                .locks
                .get(key)
                .is_some_and(|lock| lock.owner != owner && now < lock.expires_at)
        });
        if contended {
            return Ok(false);
        }

        let expires_at = now + lease;
        for key in keys {
            state
                .locks
                .insert(key.clone(), KeyLock { owner, expires_at });
        }
        Ok(true)
    }

    async fn unlock(&self, keys: &[String], owner: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        for key in keys {
            if state.locks.get(key).is_some_and(|lock| lock.owner == owner) {
                state.locks.remove(key);
            }
        }
        Ok(())
    }

    async fn apply(&self, writes: Vec<CacheWrite>) -> Result<()> {
        let mut state = self.state.write().await;
        for write in writes {
            match write {
                CacheWrite::Put(entry) => {
                    state
                        .entries
                        .insert(entry.key.clone(), StoredEntry::new(entry));
                }
                CacheWrite::Remove(key) => {
                    state.entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
