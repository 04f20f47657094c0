//! Errors returned by the engine's control surface.

use std::path::PathBuf;

use crate::task_db::{StoreError, TaskId, TaskStatus};
use crate::transfer::TransferError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// The operation does not apply to a task in its current status.
    #[error("task {id} is {status}, expected {expected}")]
    InvalidStatus {
        id: TaskId,
        status: TaskStatus,
        expected: &'static str,
    },
    /// Resume was requested but the partial data is gone or was never proven resumable.
    #[error("task {0} has no partial data to resume from")]
    NoPartialData(TaskId),
    #[error("task {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// Task content could not be inspected or removed.
    #[error("task content {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl EngineError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
