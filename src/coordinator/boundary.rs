//! Orchestration boundary: the scope that decides the relational outcome.
//!
//! A boundary owns one relational transaction. It commits when the unit of
//! work returns `Ok` and rolls back when it returns `Err`. If the scope is
//! dropped unresolved (a panic, or a caller that bails out early) the
//! underlying transaction is dropped too, which discards its writes.
//!
//! The boundary knows nothing about cache transactions.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{CoordinatorError, Result};
use crate::model::Record;
use crate::storage::{RelationalStore, RelationalTransaction, StorageError};

/// Opens boundary scopes over a relational store.
#[derive(Clone)]
pub struct OrchestrationBoundary {
    store: Arc<dyn RelationalStore>,
}

impl OrchestrationBoundary {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    /// Open a scope. The caller must resolve it with `commit`, `rollback`
    /// or `finish`; dropping it discards its writes.
    pub async fn begin(&self) -> Result<BoundaryScope> {
        let tx = self.store.begin().await?;
        let scope = BoundaryScope {
            id: Uuid::new_v4(),
            tx: Some(tx),
        };
        debug!(boundary = %scope.id, "Orchestration boundary opened");
        Ok(scope)
    }

    /// Run `unit` inside a fresh scope: commit on `Ok`, roll back on `Err`.
    ///
    /// ```ignore
    /// boundary
    ///     .execute(move |scope| {
    ///         Box::pin(async move { records.save(scope, record, FaultHook::none()).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute<T, F>(&self, unit: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut BoundaryScope) -> BoxFuture<'s, Result<T>>,
    {
        let mut scope = self.begin().await?;
        let outcome = unit(&mut scope).await;
        scope.finish(outcome).await
    }
}

/// An open orchestration boundary with its enlisted relational transaction.
pub struct BoundaryScope {
    id: Uuid,
    tx: Option<Box<dyn RelationalTransaction>>,
}

impl BoundaryScope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn transaction(&mut self) -> Result<&mut (dyn RelationalTransaction + 'static)> {
        self.tx
            .as_deref_mut()
            .ok_or(CoordinatorError::Storage(StorageError::TransactionClosed))
    }

    /// Save a record enlisted in this boundary.
    pub async fn save(&mut self, record: Record) -> Result<Record> {
        Ok(self.transaction()?.save(record).await?)
    }

    /// Look up a record as this boundary sees it.
    pub async fn find_by_id(&mut self, id: i64) -> Result<Option<Record>> {
        Ok(self.transaction()?.find_by_id(id).await?)
    }

    pub async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StorageError::TransactionClosed)?;
        tx.commit().await?;
        info!(boundary = %self.id, "Orchestration boundary committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StorageError::TransactionClosed)?;
        tx.rollback().await?;
        info!(boundary = %self.id, "Orchestration boundary rolled back");
        Ok(())
    }

    /// Resolve the scope from a unit of work's outcome.
    ///
    /// On `Err` the rollback is attempted once; if it fails, the result is
    /// [`CoordinatorError::RollbackFailed`] carrying both failures.
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let id = self.id;
                warn!(boundary = %id, error = %err, "Unit of work failed, rolling back");
                match self.rollback().await {
                    Ok(()) => Err(err),
                    Err(cause) => {
                        error!(boundary = %id, error = %cause, "Boundary rollback failed");
                        Err(CoordinatorError::rollback_failed(err, cause))
                    }
                }
            }
        }
    }
}

impl Drop for BoundaryScope {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(boundary = %self.id, "Boundary dropped unresolved, relational writes discarded");
        }
    }
}
