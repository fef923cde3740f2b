//! Redis distributed cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use tracing::{debug, info};
use uuid::Uuid;

use super::{CacheEntry, CacheWrite, DistributedCache, Result};

/// Lock every key for ARGV[1] with a PX of ARGV[2], or none of them.
const LOCK_SCRIPT: &str = r#"
for _, key in ipairs(KEYS) do
    local holder = redis.call('GET', key)
    if holder and holder ~= ARGV[1] then
        return 0
    end
end
for _, key in ipairs(KEYS) do
    redis.call('SET', key, ARGV[1], 'PX', ARGV[2])
end
return 1
"#;

/// Delete the keys still held by ARGV[1].
const UNLOCK_SCRIPT: &str = r#"
local released = 0
for _, key in ipairs(KEYS) do
    if redis.call('GET', key) == ARGV[1] then
        redis.call('DEL', key)
        released = released + 1
    end
end
return released
"#;

/// Redis cache.
///
/// Entries are stored as JSON at `{prefix}:entry:{key}` with the TTL as a PX
/// expiry. Transaction locks live at `{prefix}:lock:{key}` and hold the
/// owning transaction id; the two segments never overlap, whatever the
/// caller's key looks like. Committed writes go out as one MULTI/EXEC.
///
/// `clear` removes entries only. Locks held by committing transactions are
/// left to their owners and their PX.
pub struct RedisCache {
    conn: ConnectionManager,
    key_prefix: String,
    lock_script: Script,
    unlock_script: Script,
}

impl RedisCache {
    /// Create a new Redis cache.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `key_prefix` - Prefix for all keys (default: "sessionCache")
    pub async fn new(url: &str, key_prefix: Option<&str>) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis for cache");

        Ok(Self {
            conn,
            key_prefix: key_prefix.unwrap_or("sessionCache").to_string(),
            lock_script: Script::new(LOCK_SCRIPT),
            unlock_script: Script::new(UNLOCK_SCRIPT),
        })
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:entry:{}", self.key_prefix, key)
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.key_prefix, key)
    }
}

fn px(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl DistributedCache for RedisCache {
    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let key = self.entry_key(&entry.key);
        let json = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();

        match entry.ttl {
            Some(ttl) => {
                let _: () = conn.pset_ex(&key, json, px(ttl)).await?;
            }
            None => {
                let _: () = conn.set(&key, json).await?;
            }
        }

        debug!(key = %entry.key, "Stored cache entry in Redis");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.entry_key(key)).await?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.entry_key(key)).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:entry:*", self.key_prefix);

        let mut cursor = 0u64;
        let mut keys: Vec<String> = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        if !keys.is_empty() {
            let _: () = conn.del(&keys).await?;
        }

        debug!(prefix = %self.key_prefix, removed = keys.len(), "Cleared Redis cache");
        Ok(())
    }

    async fn try_lock(&self, keys: &[String], owner: Uuid, lease: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.lock_script.prepare_invoke();
        for key in keys {
            invocation.key(self.lock_key(key));
        }
        invocation.arg(owner.to_string()).arg(px(lease));

        let acquired: i32 = invocation.invoke_async(&mut conn).await?;
        Ok(acquired == 1)
    }

    async fn unlock(&self, keys: &[String], owner: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.unlock_script.prepare_invoke();
        for key in keys {
            invocation.key(self.lock_key(key));
        }
        invocation.arg(owner.to_string());

        let released: i32 = invocation.invoke_async(&mut conn).await?;
        debug!(%owner, released, "Released cache key locks");
        Ok(())
    }

    async fn apply(&self, writes: Vec<CacheWrite>) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for write in &writes {
            match write {
                CacheWrite::Put(entry) => {
                    let key = self.entry_key(&entry.key);
                    let json = serde_json::to_string(entry)?;
                    match entry.ttl {
                        Some(ttl) => pipe.pset_ex(key, json, px(ttl)).ignore(),
                        None => pipe.set(key, json).ignore(),
                    };
                }
                CacheWrite::Remove(key) => {
                    pipe.del(self.entry_key(key)).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(writes = writes.len(), "Applied cache writes in Redis");
        Ok(())
    }
}
