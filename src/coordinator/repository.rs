//! Store adapters used inside a unit of work.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::boundary::BoundaryScope;
use super::error::{CoordinatorError, Result};
use super::fault::{FaultHook, FaultPoint};
use crate::cache::{CacheEntry, CacheTransaction, DistributedCache, TransactionOptions};
use crate::model::Record;
use crate::storage::RelationalStore;

/// Relational adapter. Writes go through the caller's boundary.
#[derive(Clone)]
pub struct RecordRepository {
    store: Arc<dyn RelationalStore>,
}

impl RecordRepository {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    /// Save `record` within `scope`.
    ///
    /// With a fault hook targeting [`FaultPoint::AfterRelationalWrite`], the
    /// write is issued and then the call fails, so the boundary has a real
    /// write to roll back. No retries: every failure reaches the boundary.
    pub async fn save(
        &self,
        scope: &mut BoundaryScope,
        record: Record,
        fault: FaultHook,
    ) -> Result<Record> {
        let saved = scope.save(record).await?;
        debug!(boundary = %scope.id(), id = ?saved.id, "Record written");
        fault.trigger(FaultPoint::AfterRelationalWrite)?;
        Ok(saved)
    }

    /// Look up a committed record.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Record>> {
        Ok(self.store.find_by_id(id).await?)
    }
}

/// Immediate cache adapter.
///
/// Writes take effect at once and are not retracted by any later failure in
/// the same unit of work.
#[derive(Clone)]
pub struct CacheRepository {
    cache: Arc<dyn DistributedCache>,
}

impl CacheRepository {
    pub fn new(cache: Arc<dyn DistributedCache>) -> Self {
        Self { cache }
    }

    pub async fn put(&self, entry: CacheEntry) -> Result<()> {
        debug!(key = %entry.key, "Cache write (immediate)");
        Ok(self.cache.put(entry).await?)
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.cache.get(key).await?)
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        Ok(self.cache.remove(key).await?)
    }

    pub async fn clear(&self) -> Result<()> {
        Ok(self.cache.clear().await?)
    }
}

/// Transactional cache adapter.
#[derive(Clone)]
pub struct TransactionalCache {
    cache: Arc<dyn DistributedCache>,
    options: TransactionOptions,
}

impl TransactionalCache {
    pub fn new(cache: Arc<dyn DistributedCache>, options: TransactionOptions) -> Self {
        Self { cache, options }
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Open a transaction with the configured policy.
    pub fn begin_transaction(&self) -> CacheTransaction {
        self.begin_transaction_with(self.options)
    }

    /// Open a transaction with an explicit policy.
    pub fn begin_transaction_with(&self, options: TransactionOptions) -> CacheTransaction {
        CacheTransaction::begin(Arc::clone(&self.cache), options)
    }

    /// Run `action` in a new cache transaction and hand the transaction back.
    ///
    /// 1. Open a transaction with the configured policy.
    /// 2. Run `action` with a handle to it.
    /// 3. Fail here if `fault` targets [`FaultPoint::InsideCacheTransaction`].
    /// 4. Commit if `commit_inside` is set.
    /// 5. On any failure in 2-4, roll back exactly once and return the
    ///    failure (or [`CoordinatorError::RollbackFailed`] if rollback fails).
    /// 6. Otherwise return the action's result and the handle, which is
    ///    committed if `commit_inside` was set and still open if not.
    ///
    /// An open handle is the caller's to commit. Committing it after the
    /// caller's boundary has rolled back makes the cache write durable while
    /// the relational write is gone; nothing here can prevent that.
    pub async fn run_in_transaction<T, F, Fut>(
        &self,
        action: F,
        fault: FaultHook,
        commit_inside: bool,
    ) -> Result<(T, CacheTransaction)>
    where
        F: FnOnce(CacheTransaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let tx = self.begin_transaction();

        let outcome: Result<T> = async {
            let value = action(tx.clone()).await?;
            fault.trigger(FaultPoint::InsideCacheTransaction)?;
            if commit_inside {
                tx.commit().await?;
            }
            Ok(value)
        }
        .await;

        match outcome {
            Ok(value) => Ok((value, tx)),
            Err(err) => {
                warn!(tx = %tx.id(), error = %err, "Cache transaction action failed, rolling back");
                match tx.rollback().await {
                    Ok(()) => Err(err),
                    Err(cause) => {
                        error!(tx = %tx.id(), error = %cause, "Cache transaction rollback failed");
                        Err(CoordinatorError::rollback_failed(err, cause))
                    }
                }
            }
        }
    }
}
