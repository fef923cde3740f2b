//! Relational record storage.
//!
//! The relational side of a unit of work. Writes are only ever issued through
//! a [`RelationalTransaction`], which the orchestration boundary opens and
//! resolves; nothing a transaction writes is visible through
//! [`RelationalStore::find_by_id`] until it commits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::model::Record;

pub mod memory;
mod schema;
mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Errors raised by relational storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transaction already closed")]
    TransactionClosed,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Interface for relational record persistence.
///
/// Implementations:
/// - `SqliteRecordStore`: SQLite storage
/// - `InMemoryRecordStore`: In-memory storage with failure injection for testing
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Open a local transaction that enlists every write made through it.
    async fn begin(&self) -> Result<Box<dyn RelationalTransaction>>;

    /// Look up a committed record.
    ///
    /// Returns `None` if no committed record has this identifier.
    async fn find_by_id(&self, id: i64) -> Result<Option<Record>>;
}

/// A local transaction against a [`RelationalStore`].
///
/// Dropping a transaction without calling `commit` discards its writes.
#[async_trait]
pub trait RelationalTransaction: Send {
    /// Insert or update a record by identifier.
    ///
    /// Records without an identifier get one assigned; the returned record
    /// always carries it.
    async fn save(&mut self, record: Record) -> Result<Record>;

    /// Look up a record, including writes staged in this transaction.
    async fn find_by_id(&mut self, id: i64) -> Result<Option<Record>>;

    /// Make every write in this transaction durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write in this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Initialize the relational store based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn RelationalStore>> {
    match config.storage_type {
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");

            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let store = SqliteRecordStore::open(&config.sqlite.path).await.map_err(|e| {
                error!(error = %e, "Failed to open SQLite record store");
                e
            })?;
            Ok(Arc::new(store))
        }
        StorageType::Memory => {
            info!("Storage: memory");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}
