//! Task store error type.

use super::types::TaskId;

/// A store operation that could not be committed. Callers should treat any
/// in-memory copy of the task as stale and re-read it before retrying.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task headers encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("task database path: {0}")]
    Io(#[from] std::io::Error),
    #[error("task database location: {0}")]
    Location(#[from] xdg::BaseDirectoriesError),
    /// A partial update or rotation matched no row.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// A row holds a value this version cannot interpret.
    #[error("task {task_id}: invalid stored {column} {value:?}")]
    Corrupt {
        task_id: String,
        column: &'static str,
        value: String,
    },
}
