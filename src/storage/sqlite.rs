//! SQLite implementation of the relational store.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::schema::{Records, CREATE_RECORDS_TABLE};
use super::{RelationalStore, RelationalTransaction, Result};
use crate::model::Record;

/// SQLite implementation of RelationalStore.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new SQLite record store over an existing pool.
    ///
    /// Call [`init`](Self::init) before first use if the schema may be missing.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a database file and initialize the schema.
    ///
    /// Uses WAL journaling so committed-view reads are not blocked by an open
    /// boundary transaction.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_RECORDS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    fn select_by_id(id: i64) -> String {
        Query::select()
            .columns([Records::Id, Records::Name])
            .from(Records::Table)
            .and_where(Expr::col(Records::Id).eq(id))
            .to_string(SqliteQueryBuilder)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    Ok(Record {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
    })
}

#[async_trait]
impl RelationalStore for SqliteRecordStore {
    async fn begin(&self) -> Result<Box<dyn RelationalTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteRecordTransaction { tx }))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Record>> {
        let query = Self::select_by_id(id);
        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(record_from_row).transpose()
    }
}

/// A transaction on the SQLite pool.
///
/// sqlx rolls the underlying transaction back when it is dropped unresolved.
struct SqliteRecordTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl RelationalTransaction for SqliteRecordTransaction {
    async fn save(&mut self, record: Record) -> Result<Record> {
        let query = match record.id {
            Some(id) => Query::insert()
                .into_table(Records::Table)
                .columns([Records::Id, Records::Name])
                .values_panic([id.into(), record.name.clone().into()])
                .on_conflict(
                    OnConflict::column(Records::Id)
                        .update_column(Records::Name)
                        .to_owned(),
                )
                .returning_col(Records::Id)
                .to_string(SqliteQueryBuilder),
            None => Query::insert()
                .into_table(Records::Table)
                .columns([Records::Name])
                .values_panic([record.name.clone().into()])
                .returning_col(Records::Id)
                .to_string(SqliteQueryBuilder),
        };

        let row = sqlx::query(&query).fetch_one(&mut *self.tx).await?;
        let id: i64 = row.try_get("id")?;

        debug!(id, "Saved record");
        Ok(Record {
            id: Some(id),
            name: record.name,
        })
    }

    async fn find_by_id(&mut self, id: i64) -> Result<Option<Record>> {
        let query = SqliteRecordStore::select_by_id(id);
        let row = sqlx::query(&query).fetch_optional(&mut *self.tx).await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
