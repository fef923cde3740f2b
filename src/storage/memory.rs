//! In-memory relational store.
//!
//! Used by the `memory` storage type and by tests. Writes are staged per
//! transaction and applied on commit. Commit and rollback can be forced to
//! fail to exercise the coordinator's rollback-failure path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{RelationalStore, RelationalTransaction, Result, StorageError};
use crate::model::Record;

struct Shared {
    records: RwLock<BTreeMap<i64, Record>>,
    next_id: AtomicI64,
    fail_on_commit: RwLock<bool>,
    fail_on_rollback: RwLock<bool>,
}

/// In-memory record store.
pub struct InMemoryRecordStore {
    shared: Arc<Shared>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                records: RwLock::new(BTreeMap::new()),
                next_id: AtomicI64::new(1),
                fail_on_commit: RwLock::new(false),
                fail_on_rollback: RwLock::new(false),
            }),
        }
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.shared.fail_on_commit.write().await = fail;
    }

    pub async fn set_fail_on_rollback(&self, fail: bool) {
        *self.shared.fail_on_rollback.write().await = fail;
    }

    pub async fn committed_count(&self) -> usize {
        self.shared.records.read().await.len()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn RelationalTransaction>> {
        Ok(Box::new(InMemoryRecordTransaction {
            shared: Arc::clone(&self.shared),
            staged: BTreeMap::new(),
        }))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Record>> {
        Ok(self.shared.records.read().await.get(&id).cloned())
    }
}

struct InMemoryRecordTransaction {
    shared: Arc<Shared>,
    staged: BTreeMap<i64, Record>,
}

#[async_trait]
impl RelationalTransaction for InMemoryRecordTransaction {
    async fn save(&mut self, record: Record) -> Result<Record> {
        // Identifiers are never reused, even when the allocating transaction rolls back.
        let id = match record.id {
            Some(id) => {
                self.shared
                    .next_id
                    .fetch_max(id.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => self
                .shared
                .next_id
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                    next.checked_add(1)
                })
                .map_err(|_| StorageError::Unavailable("record identifiers exhausted".to_string()))?,
        };

        let saved = Record {
            id: Some(id),
            name: record.name,
        };
        self.staged.insert(id, saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&mut self, id: i64) -> Result<Option<Record>> {
        if let Some(record) = self.staged.get(&id) {
            return Ok(Some(record.clone()));
        }
        Ok(self.shared.records.read().await.get(&id).cloned())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { shared, staged } = *self;
        if *shared.fail_on_commit.read().await {
            return Err(StorageError::Unavailable("commit refused".to_string()));
        }

        let count = staged.len();
        shared.records.write().await.extend(staged);
        debug!(count, "Committed staged records");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if *self.shared.fail_on_rollback.read().await {
            return Err(StorageError::Unavailable("rollback refused".to_string()));
        }

        debug!(count = self.staged.len(), "Discarded staged records");
        Ok(())
    }
}
