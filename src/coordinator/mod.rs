//! Best-effort write coordination across the relational store and the cache.
//!
//! There is no cross-store log and no atomic entry point. The coordinator
//! composes an [`OrchestrationBoundary`] (relational side) with one of the
//! two cache adapters, in one of three patterns:
//!
//! | Pattern | Cache write | Relational failure leaves |
//! |---|---|---|
//! | A, [`WriteCoordinator::write_boundary_only`] | immediate, before the record | cache entry present |
//! | B, [`WriteCoordinator::write_commit_inside`] | transaction committed inside the helper | cache entry present |
//! | C, [`WriteCoordinator::write_commit_deferred`] | transaction left open for the caller | nothing, unless the caller commits anyway |
//!
//! Only pattern C can end with both stores empty after a failure. It returns
//! a [`DeferredWrite`]: [`DeferredWrite::finish`] commits the cache side only
//! if the relational side committed. Committing `pending` by hand after a
//! relational failure reproduces the hazard of pattern B.
//!
//! Writes within one boundary run in the order the caller issues them. The
//! only local recovery is a single rollback of whatever transaction the
//! coordinator opened; every failure reaches the caller.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{CacheEntry, CacheTransaction, DistributedCache, TransactionOptions};
use crate::model::Record;
use crate::storage::RelationalStore;

mod boundary;
mod error;
mod fault;
mod repository;

pub use boundary::{BoundaryScope, OrchestrationBoundary};
pub use error::{CoordinatorError, Result};
pub use fault::{FaultHook, FaultPoint};
pub use repository::{CacheRepository, RecordRepository, TransactionalCache};

/// Pattern entry points over one relational store and one cache.
#[derive(Clone)]
pub struct WriteCoordinator {
    boundary: OrchestrationBoundary,
    records: RecordRepository,
    cache: CacheRepository,
    transactional: TransactionalCache,
}

impl WriteCoordinator {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn DistributedCache>,
        options: TransactionOptions,
    ) -> Self {
        Self {
            boundary: OrchestrationBoundary::new(Arc::clone(&store)),
            records: RecordRepository::new(store),
            cache: CacheRepository::new(Arc::clone(&cache)),
            transactional: TransactionalCache::new(cache, options),
        }
    }

    pub fn boundary(&self) -> &OrchestrationBoundary {
        &self.boundary
    }

    pub fn records(&self) -> &RecordRepository {
        &self.records
    }

    pub fn cache(&self) -> &CacheRepository {
        &self.cache
    }

    pub fn transactional(&self) -> &TransactionalCache {
        &self.transactional
    }

    /// Pattern A: immediate cache write, then the record, in one boundary.
    ///
    /// A relational failure rolls back the record; the cache entry stays.
    pub async fn write_boundary_only(
        &self,
        record: Record,
        entry: CacheEntry,
        fault: FaultHook,
    ) -> Result<Record> {
        let records = self.records.clone();
        let cache = self.cache.clone();

        let saved = self
            .boundary
            .execute(move |scope| {
                Box::pin(async move {
                    cache.put(entry).await?;
                    records.save(scope, record, fault).await
                })
            })
            .await?;

        info!(id = ?saved.id, "Boundary-only write completed");
        Ok(saved)
    }

    /// Pattern B: cache transaction committed inside the helper, then the
    /// record, in one boundary.
    ///
    /// A relational failure rolls back the record; the committed cache entry
    /// stays. The returned handle is already committed.
    pub async fn write_commit_inside(
        &self,
        record: Record,
        entry: CacheEntry,
        fault: FaultHook,
    ) -> Result<(Record, CacheTransaction)> {
        let records = self.records.clone();
        let transactional = self.transactional.clone();

        let (saved, tx) = self
            .boundary
            .execute(move |scope| {
                Box::pin(async move {
                    let ((), tx) = transactional
                        .run_in_transaction(
                            move |tx| async move {
                                tx.put(entry).await?;
                                Ok::<_, CoordinatorError>(())
                            },
                            fault,
                            true,
                        )
                        .await?;
                    let saved = records.save(scope, record, fault).await?;
                    Ok((saved, tx))
                })
            })
            .await?;

        info!(id = ?saved.id, tx = %tx.id(), "Commit-inside write completed");
        Ok((saved, tx))
    }

    /// Pattern C: open cache transaction, then the record, in one boundary.
    ///
    /// Returns `Err` only if the cache step itself failed (the boundary is
    /// rolled back and nothing was committed anywhere). Otherwise the
    /// relational outcome is in [`DeferredWrite::relational`] and the cache
    /// transaction is still open in [`DeferredWrite::pending`].
    pub async fn write_commit_deferred(
        &self,
        record: Record,
        entry: CacheEntry,
        fault: FaultHook,
    ) -> Result<DeferredWrite> {
        let mut scope = self.boundary.begin().await?;

        let staged = self
            .transactional
            .run_in_transaction(
                move |tx| async move {
                    tx.put(entry).await?;
                    Ok::<_, CoordinatorError>(())
                },
                fault,
                false,
            )
            .await;
        let ((), pending) = match staged {
            Ok(staged) => staged,
            Err(err) => return scope.finish(Err(err)).await,
        };

        let outcome = self.records.save(&mut scope, record, fault).await;
        let relational = scope.finish(outcome).await;

        if let Err(err) = &relational {
            warn!(
                tx = %pending.id(),
                error = %err,
                "Relational write failed, cache transaction left open for the caller"
            );
        }

        Ok(DeferredWrite {
            relational,
            pending,
        })
    }
}

/// Outcome of a commit-deferred write.
#[derive(Debug)]
#[must_use = "the pending cache transaction must be finished, committed or rolled back"]
pub struct DeferredWrite {
    /// What the orchestration boundary did with the record.
    pub relational: Result<Record>,
    /// The cache transaction, still open.
    pub pending: CacheTransaction,
}

impl DeferredWrite {
    pub fn is_relational_committed(&self) -> bool {
        self.relational.is_ok()
    }

    /// Commit the cache transaction if the relational side committed, roll it
    /// back otherwise.
    ///
    /// A failed cache commit after a relational commit is rolled back and
    /// reported; the record stays committed.
    pub async fn finish(self) -> Result<Record> {
        let DeferredWrite {
            relational,
            pending,
        } = self;

        let outcome = match relational {
            Ok(record) => match pending.commit().await {
                Ok(()) => return Ok(record),
                Err(err) => {
                    warn!(tx = %pending.id(), error = %err, "Deferred cache commit failed after relational commit");
                    CoordinatorError::from(err)
                }
            },
            Err(err) => err,
        };

        match pending.rollback().await {
            Ok(()) => Err(outcome),
            Err(cause) => Err(CoordinatorError::rollback_failed(outcome, cause)),
        }
    }
}
