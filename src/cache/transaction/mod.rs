//! Explicit cache transactions.
//!
//! A [`CacheTransaction`] is a cloneable handle over shared, state-tagged
//! transaction data. Whoever holds a clone can commit or roll it back, which
//! is what lets a helper open a transaction and hand the decision to commit
//! back to its caller.
//!
//! Lifecycle:
//!
//! ```text
//!            commit ok                      rollback
//!   Open ─────────────────▶ Committed    Open ─────────▶ RolledBack
//!     │
//!     └── deadline passes (checked on every operation) ──▶ Expired
//! ```
//!
//! Writes are staged in the handle and are invisible to cache readers until
//! commit. Commit locks the written keys (retrying on contention with a
//! constant interval), applies every staged write atomically, and releases
//! the locks. The whole sequence is bounded by the transaction timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{CacheEntry, CacheError, CacheWrite, DistributedCache, Result};
use crate::utils::retry::contention_backoff;

/// Where a cache transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
    Expired,
}

impl TransactionState {
    pub fn is_resolved(self) -> bool {
        self != TransactionState::Open
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::Expired => "expired",
        })
    }
}

/// Timeout and retry policy for a cache transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Hard ceiling on how long the transaction may stay open, retries included.
    pub timeout: Duration,
    /// Extra attempts to lock the written keys when another transaction holds them.
    pub retry_attempts: usize,
    /// Delay between lock attempts.
    pub retry_interval: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_attempts: 3,
            retry_interval: Duration::from_secs(2),
        }
    }
}

impl TransactionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: usize) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

struct Inner {
    state: TransactionState,
    /// At most one write per key; a later write to the same key replaces it.
    writes: Vec<CacheWrite>,
}

impl Inner {
    fn stage(&mut self, write: CacheWrite) {
        let key = write.key().to_string();
        match self.writes.iter_mut().find(|staged| staged.key() == key) {
            Some(slot) => *slot = write,
            None => self.writes.push(write),
        }
    }

    fn discard(&mut self, state: TransactionState) -> usize {
        let discarded = self.writes.len();
        self.writes.clear();
        self.state = state;
        discarded
    }
}

/// Handle to an explicit cache transaction.
///
/// Clones share state: committing through one clone commits them all.
/// `commit` and `rollback` are idempotent; crossing from one resolved state
/// to the other fails with [`CacheError::AlreadyResolved`].
#[derive(Clone)]
pub struct CacheTransaction {
    id: Uuid,
    options: TransactionOptions,
    deadline: Instant,
    cache: Arc<dyn DistributedCache>,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for CacheTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheTransaction")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CacheTransaction {
    /// Open a transaction against `cache`. The timeout starts now.
    pub fn begin(cache: Arc<dyn DistributedCache>, options: TransactionOptions) -> Self {
        let id = Uuid::new_v4();
        debug!(
            tx = %id,
            timeout = ?options.timeout,
            retry_attempts = options.retry_attempts,
            retry_interval = ?options.retry_interval,
            "Cache transaction opened"
        );

        Self {
            id,
            options,
            deadline: Instant::now() + options.timeout,
            cache,
            inner: Arc::new(Mutex::new(Inner {
                state: TransactionState::Open,
                writes: Vec::new(),
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Current state, after accounting for the deadline.
    pub async fn state(&self) -> TransactionState {
        let mut inner = self.inner.lock().await;
        self.check_expiry(&mut inner);
        inner.state
    }

    /// Stage an entry. Invisible to other readers until commit.
    pub async fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&mut inner)?;
        inner.stage(CacheWrite::Put(entry));
        Ok(())
    }

    /// Stage a removal.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&mut inner)?;
        inner.stage(CacheWrite::Remove(key.to_string()));
        Ok(())
    }

    /// Read through the transaction's view: staged writes first, then the cache.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let staged = {
            let mut inner = self.inner.lock().await;
            self.ensure_open(&mut inner)?;
            inner.writes.iter().find(|w| w.key() == key).cloned()
        };

        match staged {
            Some(CacheWrite::Put(entry)) => Ok(Some(entry)),
            Some(CacheWrite::Remove(_)) => Ok(None),
            None => self.cache.get(key).await,
        }
    }

    /// Lock the written keys, apply every staged write, and release the locks.
    ///
    /// Fails with [`CacheError::ContentionExhausted`] when the keys stay
    /// locked through every retry (the transaction stays open and should be
    /// rolled back), or [`CacheError::TransactionExpired`] when the timeout
    /// passes first (the staged writes are dropped).
    pub async fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.check_expiry(&mut inner);

        match inner.state {
            TransactionState::Open => {}
            TransactionState::Committed => {
                debug!(tx = %self.id, "Cache transaction already committed");
                return Ok(());
            }
            TransactionState::Expired => return Err(self.expired()),
            state @ TransactionState::RolledBack => {
                return Err(CacheError::AlreadyResolved { id: self.id, state })
            }
        }

        if inner.writes.is_empty() {
            inner.state = TransactionState::Committed;
            info!(tx = %self.id, "Cache transaction committed with no writes");
            return Ok(());
        }

        let mut keys: Vec<String> = inner.writes.iter().map(|w| w.key().to_string()).collect();
        keys.sort();

        match tokio::time::timeout_at(self.deadline, self.lock_keys(&keys)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(tx = %self.id, error = %err, "Cache transaction commit failed");
                return Err(err);
            }
            Err(_) => {
                if let Err(err) = self.cache.unlock(&keys, self.id).await {
                    debug!(tx = %self.id, error = %err, "Lock release after expiry failed");
                }
                let discarded = inner.discard(TransactionState::Expired);
                warn!(
                    tx = %self.id,
                    timeout = ?self.options.timeout,
                    discarded,
                    "Cache transaction expired while waiting for key locks"
                );
                return Err(self.expired());
            }
        }

        let applied = self.cache.apply(inner.writes.clone()).await;
        if let Err(err) = self.cache.unlock(&keys, self.id).await {
            warn!(tx = %self.id, error = %err, "Failed to release key locks; they lapse at the transaction deadline");
        }
        applied?;

        let applied = inner.discard(TransactionState::Committed);
        info!(tx = %self.id, writes = applied, "Cache transaction committed");
        Ok(())
    }

    /// Discard staged writes.
    ///
    /// A no-op on a transaction that is already rolled back or expired.
    pub async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.check_expiry(&mut inner);

        match inner.state {
            TransactionState::Open => {
                let discarded = inner.discard(TransactionState::RolledBack);
                info!(tx = %self.id, discarded, "Cache transaction rolled back");
                Ok(())
            }
            TransactionState::RolledBack | TransactionState::Expired => {
                debug!(tx = %self.id, state = %inner.state, "Rollback of resolved transaction ignored");
                Ok(())
            }
            state @ TransactionState::Committed => {
                Err(CacheError::AlreadyResolved { id: self.id, state })
            }
        }
    }

    async fn lock_keys(&self, keys: &[String]) -> Result<()> {
        let attempts = self.options.retry_attempts + 1;

        (|| async {
            let lease = self
                .deadline
                .saturating_duration_since(Instant::now())
                .max(Duration::from_millis(1));

            if self.cache.try_lock(keys, self.id, lease).await? {
                Ok(())
            } else {
                Err(CacheError::ContentionExhausted {
                    id: self.id,
                    keys: keys.to_vec(),
                    attempts,
                })
            }
        })
        .retry(contention_backoff(&self.options))
        .when(|err| matches!(err, CacheError::ContentionExhausted { .. }))
        .notify(|_: &CacheError, delay: Duration| {
            warn!(tx = %self.id, ?delay, "Cache keys locked by another transaction, retrying");
        })
        .await
    }

    fn check_expiry(&self, inner: &mut Inner) {
        if inner.state == TransactionState::Open && Instant::now() >= self.deadline {
            let discarded = inner.discard(TransactionState::Expired);
            warn!(
                tx = %self.id,
                timeout = ?self.options.timeout,
                discarded,
                "Cache transaction expired; staged writes discarded"
            );
        }
    }

    fn ensure_open(&self, inner: &mut Inner) -> Result<()> {
        self.check_expiry(inner);
        match inner.state {
            TransactionState::Open => Ok(()),
            TransactionState::Expired => Err(self.expired()),
            state => Err(CacheError::AlreadyResolved { id: self.id, state }),
        }
    }

    fn expired(&self) -> CacheError {
        CacheError::TransactionExpired {
            id: self.id,
            timeout: self.options.timeout,
        }
    }
}
