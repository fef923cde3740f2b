//! Domain values written through the coordinator.

use serde::{Deserialize, Serialize};

/// A row in the relational store.
///
/// `id` is `None` until the store assigns one on first insert. A caller may
/// also supply its own identifier, in which case `save` inserts or updates
/// that row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<i64>,
    pub name: String,
}

impl Record {
    /// A record with a caller-supplied identifier.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
        }
    }

    /// A record whose identifier the store will assign.
    pub fn unsaved(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// Login session cached alongside a user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user_id: i64) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
