//! Cache and cache transaction configuration types.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::TransactionOptions;

/// Cache type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    #[default]
    Memory,
    Redis,
}

/// Distributed cache configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache type discriminator.
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    /// Redis-specific configuration.
    pub redis: RedisConfig,
}

/// Redis-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Prefix for every key the cache writes, lock keys included.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "sessionCache".to_string(),
        }
    }
}

/// Cache transaction policy, in milliseconds for YAML/env friendliness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Maximum time a cache transaction may stay open. Default: 5000.
    pub timeout_ms: u64,
    /// Lock retries on commit contention. Default: 3.
    pub retry_attempts: usize,
    /// Delay between lock retries. Default: 2000.
    pub retry_interval_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        let options = TransactionOptions::default();
        Self {
            timeout_ms: options.timeout.as_millis() as u64,
            retry_attempts: options.retry_attempts,
            retry_interval_ms: options.retry_interval.as_millis() as u64,
        }
    }
}

impl TransactionConfig {
    pub fn options(&self) -> TransactionOptions {
        TransactionOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            retry_attempts: self.retry_attempts,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}
