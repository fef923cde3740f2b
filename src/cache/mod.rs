//! Distributed cache capability.
//!
//! Two consistency tiers sit on top of the same [`DistributedCache`]:
//!
//! - Immediate: `put`/`get`/`remove`/`clear` take effect at once and are not
//!   enlisted in anything.
//! - Transactional: a [`CacheTransaction`] stages writes in a local view and
//!   applies them atomically on commit, after locking the written keys with a
//!   bounded retry and a hard timeout.
//!
//! The lock and apply primitives on the trait exist for the transactional
//! tier; callers should go through [`CacheTransaction`] rather than use them
//! directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::{CacheConfig, CacheType};

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
mod transaction;

pub use memory::InMemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
pub use transaction::{CacheTransaction, TransactionOptions, TransactionState};

/// Errors raised by the cache and by cache transactions.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache transaction {id} expired (timeout {timeout:?})")]
    TransactionExpired { id: Uuid, timeout: Duration },

    #[error("Cache transaction {id} could not lock {keys:?} after {attempts} attempts")]
    ContentionExhausted {
        id: Uuid,
        keys: Vec<String>,
        attempts: usize,
    },

    #[error("Cache transaction {id} already {state}")]
    AlreadyResolved { id: Uuid, state: TransactionState },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A keyed cache value with an optional time-to-live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            payload,
            ttl: None,
        }
    }

    /// Serialize a typed value as the payload.
    pub fn encode<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(key, serde_json::to_value(value)?))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Deserialize the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A single staged mutation, applied as part of a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheWrite {
    Put(CacheEntry),
    Remove(String),
}

impl CacheWrite {
    pub fn key(&self) -> &str {
        match self {
            CacheWrite::Put(entry) => &entry.key,
            CacheWrite::Remove(key) => key,
        }
    }
}

/// Interface for the distributed cache.
///
/// Implementations:
/// - `InMemoryCache`: process-local map with TTL and key locks
/// - `RedisCache`: Redis storage (feature `redis`)
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Store an entry immediately, replacing any existing value.
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Retrieve a live entry.
    ///
    /// Returns `None` if the key is absent or its TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Remove an entry immediately.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry.
    ///
    /// Key locks are not entries: a transaction committing while the cache
    /// is cleared keeps its locks.
    async fn clear(&self) -> Result<()>;

    /// Lock all of `keys` for `owner`, or none of them.
    ///
    /// Returns `false` if any key is held by a different owner. Locks lapse
    /// after `lease` so an abandoned owner cannot block a key forever.
    async fn try_lock(&self, keys: &[String], owner: Uuid, lease: Duration) -> Result<bool>;

    /// Release the locks `owner` holds on `keys`.
    async fn unlock(&self, keys: &[String], owner: Uuid) -> Result<()>;

    /// Apply writes atomically: readers observe all of them or none.
    async fn apply(&self, writes: Vec<CacheWrite>) -> Result<()>;
}

/// Initialize the cache based on configuration.
pub async fn init_cache(config: &CacheConfig) -> Result<Arc<dyn DistributedCache>> {
    match config.cache_type {
        CacheType::Memory => {
            info!("Cache: memory");
            Ok(Arc::new(InMemoryCache::new()))
        }
        #[cfg(feature = "redis")]
        CacheType::Redis => {
            info!(url = %config.redis.url, "Cache: redis");
            let cache = RedisCache::new(&config.redis.url, Some(&config.redis.key_prefix)).await?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        CacheType::Redis => {
            tracing::error!("Redis cache requested but 'redis' feature is not enabled");
            Err(CacheError::Unavailable(
                "redis feature not enabled".to_string(),
            ))
        }
    }
}
