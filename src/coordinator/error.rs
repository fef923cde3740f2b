//! Coordinator error type.

use crate::cache::CacheError;
use crate::storage::StorageError;

/// Failures surfaced by the write coordinator.
///
/// The coordinator never swallows a failure. Its only local recovery is a
/// single rollback of the transaction it opened; when that rollback also
/// fails, [`CoordinatorError::RollbackFailed`] replaces the original failure
/// because the transaction's writes may not have been retracted.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Raised by the unit of work itself (business logic or an injected fault).
    #[error("Application failure: {0}")]
    Application(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Rollback failed after \"{original}\": {cause}")]
    RollbackFailed {
        original: Box<CoordinatorError>,
        #[source]
        cause: Box<CoordinatorError>,
    },
}

impl CoordinatorError {
    pub fn application(message: impl Into<String>) -> Self {
        CoordinatorError::Application(message.into())
    }

    pub fn rollback_failed(original: CoordinatorError, cause: impl Into<CoordinatorError>) -> Self {
        CoordinatorError::RollbackFailed {
            original: Box::new(original),
            cause: Box::new(cause.into()),
        }
    }

    pub fn is_application(&self) -> bool {
        matches!(self, CoordinatorError::Application(_))
    }

    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, CoordinatorError::RollbackFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
