//! Dualwrite - cross-store write coordination
//!
//! Coordinates a unit of work that writes to both a relational record store
//! and a distributed cache. Coordination is best-effort: the relational side
//! is enlisted in an orchestration boundary that commits on success and rolls
//! back on failure, while the cache side is written either immediately or
//! through an explicit, timeout/retry-bounded cache transaction whose commit
//! timing is left to the caller.
//!
//! There is no two-phase commit and no durable cross-store log. The
//! [`coordinator`] module documents the three supported write patterns and
//! the hazard window each one leaves open.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod model;
pub mod storage;
pub mod utils;

pub use cache::{CacheEntry, CacheError, CacheTransaction, DistributedCache, TransactionOptions};
pub use coordinator::{CoordinatorError, FaultHook, FaultPoint, WriteCoordinator};
pub use model::{Record, Session};
pub use storage::{RelationalStore, StorageError};
