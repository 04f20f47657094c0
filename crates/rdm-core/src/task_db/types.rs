//! Types used by the task store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::url_model;

/// MIME type stored until the response `Content-Type` is known.
pub const UNKNOWN_MIME_TYPE: &str = "unknown";

/// Opaque task identifier. Rotated on resume/retry so each attempt has its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Fresh random identifier for a new attempt.
    pub fn generate() -> Self {
        TaskId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

/// Task status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enqueued,
    Running,
    Paused,
    Canceled,
    Failed,
    Complete,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Enqueued => "enqueued",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Failed => "failed",
            TaskStatus::Complete => "complete",
        }
    }

    /// Parse a stored status. Returns `None` for values this version does not know.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enqueued" => Some(TaskStatus::Enqueued),
            "running" => Some(TaskStatus::Running),
            "paused" => Some(TaskStatus::Paused),
            "canceled" => Some(TaskStatus::Canceled),
            "failed" => Some(TaskStatus::Failed),
            "complete" => Some(TaskStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass-through flags supplied at enqueue time. The engine stores and forwards
/// them; notification and storage layers outside the engine interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    pub show_notification: bool,
    pub open_file_from_notification: bool,
    pub save_in_public_storage: bool,
    pub allow_cellular: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            show_notification: true,
            open_file_from_notification: false,
            save_in_public_storage: false,
            allow_cellular: true,
        }
    }
}

/// Full task record as persisted in the `tasks` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    /// Original request URL (never the post-redirect one).
    pub url: String,
    pub saved_dir: PathBuf,
    /// Resolved destination name; `None` until known.
    pub filename: Option<String>,
    /// Extra request headers sent on every hop of every attempt.
    pub headers: BTreeMap<String, String>,
    pub status: TaskStatus,
    /// Percentage in 0..=100.
    pub progress: u8,
    pub resumable: bool,
    pub mime_type: String,
    /// Unix milliseconds of the latest attempt's creation.
    pub time_created: i64,
    pub options: TaskOptions,
}

impl TaskRecord {
    /// Record for a freshly enqueued task.
    pub fn new_enqueued(
        task_id: TaskId,
        url: impl Into<String>,
        saved_dir: impl Into<PathBuf>,
        filename: Option<String>,
        headers: BTreeMap<String, String>,
        options: TaskOptions,
    ) -> Self {
        Self {
            task_id,
            url: url.into(),
            saved_dir: saved_dir.into(),
            filename,
            headers,
            status: TaskStatus::Enqueued,
            progress: 0,
            resumable: false,
            mime_type: UNKNOWN_MIME_TYPE.to_string(),
            time_created: super::db::unix_timestamp_millis(),
            options,
        }
    }

    /// Name used on disk: the resolved name, else the URL's last segment, else a default.
    /// Transfer, resume and remove all go through this so partial data is found again.
    pub fn effective_filename(&self) -> String {
        match &self.filename {
            Some(name) if !name.is_empty() => name.clone(),
            _ => url_model::fallback_filename(&self.url),
        }
    }

    /// Absolute destination path of this task's data.
    pub fn file_path(&self) -> PathBuf {
        self.saved_dir.join(self.effective_filename())
    }
}

/// Ordering for `TaskDb::query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskOrder {
    /// Order of first insertion (stable across id rotation).
    #[default]
    Insertion,
    /// Most recent attempt first.
    NewestFirst,
    /// Oldest attempt first.
    OldestFirst,
}

/// Caller-provided filter for `TaskDb::query`. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Match any of these statuses (empty = any status).
    pub statuses: Vec<TaskStatus>,
    pub saved_dir: Option<PathBuf>,
    pub url: Option<String>,
    pub order: TaskOrder,
    pub limit: Option<u32>,
}

impl TaskFilter {
    pub fn with_statuses(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Self::default()
        }
    }
}
