//! Task read operations: get, list, query.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::super::db::TaskDb;
use super::super::error::StoreError;
use super::super::types::{
    TaskFilter, TaskId, TaskOptions, TaskOrder, TaskRecord, TaskStatus,
};

pub(super) const TASK_COLUMNS: &str = "task_id, url, status, progress, file_name, saved_dir, \
     headers, mime_type, resumable, show_notification, open_file_from_notification, \
     time_created, save_in_public_storage, allow_cellular";

fn task_from_row(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
    let task_id: String = row.try_get("task_id")?;
    let status_str: String = row.try_get("status")?;
    let status = TaskStatus::parse(&status_str).ok_or_else(|| StoreError::Corrupt {
        task_id: task_id.clone(),
        column: "status",
        value: status_str.clone(),
    })?;
    let progress: i64 = row.try_get("progress")?;
    let headers_json: String = row.try_get("headers")?;
    let headers: BTreeMap<String, String> = if headers_json.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(&headers_json)?
    };
    let saved_dir: String = row.try_get("saved_dir")?;

    Ok(TaskRecord {
        task_id: TaskId::from(task_id),
        url: row.try_get("url")?,
        saved_dir: PathBuf::from(saved_dir),
        filename: row.try_get("file_name")?,
        headers,
        status,
        progress: progress.clamp(0, 100) as u8,
        resumable: row.try_get::<i64, _>("resumable")? != 0,
        mime_type: row.try_get("mime_type")?,
        time_created: row.try_get("time_created")?,
        options: TaskOptions {
            show_notification: row.try_get::<i64, _>("show_notification")? != 0,
            open_file_from_notification: row.try_get::<i64, _>("open_file_from_notification")?
                != 0,
            save_in_public_storage: row.try_get::<i64, _>("save_in_public_storage")? != 0,
            allow_cellular: row.try_get::<i64, _>("allow_cellular")? != 0,
        },
    })
}

impl TaskDb {
    /// Fetch the latest record for a task id.
    pub async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let sql = format!("SELECT {} FROM tasks WHERE task_id = ?1", TASK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// List all tasks in insertion order.
    pub async fn list_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.query(&TaskFilter::default()).await
    }

    /// List tasks matching `filter`, ordered as the filter asks (insertion order by default).
    pub async fn query(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM tasks WHERE 1 = 1", TASK_COLUMNS));

        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if let Some(dir) = &filter.saved_dir {
            qb.push(" AND saved_dir = ")
                .push_bind(dir.to_string_lossy().into_owned());
        }
        if let Some(url) = &filter.url {
            qb.push(" AND url = ").push_bind(url.clone());
        }

        qb.push(match filter.order {
            TaskOrder::Insertion => " ORDER BY id ASC",
            TaskOrder::NewestFirst => " ORDER BY time_created DESC, id DESC",
            TaskOrder::OldestFirst => " ORDER BY time_created ASC, id ASC",
        });
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }
}
