//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Records table schema.
#[derive(Iden)]
pub enum Records {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name"]
    Name,
}

/// SQL for creating the records table.
pub const CREATE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
"#;
