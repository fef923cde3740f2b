//! Fault injection for exercising rollback paths.
//!
//! Production call sites pass [`FaultHook::none`]. Tests pass a hook that
//! fails the unit of work at one named point, after the write at that point
//! has already been issued.

use std::fmt;

use tracing::warn;

use super::error::{CoordinatorError, Result};

/// A point in the write path where a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the relational write is issued, before `save` returns.
    AfterRelationalWrite,
    /// After the cache transaction's action ran, before any commit.
    InsideCacheTransaction,
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultPoint::AfterRelationalWrite => "after relational write",
            FaultPoint::InsideCacheTransaction => "inside cache transaction",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultHook {
    #[default]
    None,
    FailAt(FaultPoint),
}

impl FaultHook {
    pub fn none() -> Self {
        FaultHook::None
    }

    pub fn fail_at(point: FaultPoint) -> Self {
        FaultHook::FailAt(point)
    }

    /// Fail with an application failure if this hook targets `point`.
    pub fn trigger(&self, point: FaultPoint) -> Result<()> {
        match self {
            FaultHook::FailAt(target) if *target == point => {
                warn!(%point, "Injected failure");
                Err(CoordinatorError::application(format!(
                    "injected failure {point}"
                )))
            }
            _ => Ok(()),
        }
    }
}
