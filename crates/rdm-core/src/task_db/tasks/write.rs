//! Task write operations: upsert, partial updates, id rotation, removal.
//!
//! Every operation is a single statement, so SQLite applies it atomically and
//! concurrent readers never observe a half-written record.

use sqlx::sqlite::SqliteQueryResult;

use super::super::db::{unix_timestamp_millis, TaskDb};
use super::super::error::StoreError;
use super::super::types::{TaskId, TaskRecord, TaskStatus, UNKNOWN_MIME_TYPE};

fn expect_row(result: SqliteQueryResult, task_id: &TaskId) -> Result<(), StoreError> {
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(task_id.clone()));
    }
    Ok(())
}

impl TaskDb {
    /// Insert a full record, replacing every field of an existing record with the same id.
    /// The row keeps its insertion position when replaced.
    pub async fn insert_or_replace(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let headers_json = serde_json::to_string(&task.headers)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, url, status, progress, file_name, saved_dir,
                headers, mime_type, resumable, show_notification,
                open_file_from_notification, time_created,
                save_in_public_storage, allow_cellular
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(task_id) DO UPDATE SET
                url = excluded.url,
                status = excluded.status,
                progress = excluded.progress,
                file_name = excluded.file_name,
                saved_dir = excluded.saved_dir,
                headers = excluded.headers,
                mime_type = excluded.mime_type,
                resumable = excluded.resumable,
                show_notification = excluded.show_notification,
                open_file_from_notification = excluded.open_file_from_notification,
                time_created = excluded.time_created,
                save_in_public_storage = excluded.save_in_public_storage,
                allow_cellular = excluded.allow_cellular
            "#,
        )
        .bind(task.task_id.as_str())
        .bind(&task.url)
        .bind(task.status.as_str())
        .bind(i64::from(task.progress))
        .bind(&task.filename)
        .bind(task.saved_dir.to_string_lossy().into_owned())
        .bind(headers_json)
        .bind(&task.mime_type)
        .bind(task.resumable)
        .bind(task.options.show_notification)
        .bind(task.options.open_file_from_notification)
        .bind(task.time_created)
        .bind(task.options.save_in_public_storage)
        .bind(task.options.allow_cellular)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update status and progress only.
    pub async fn update_status_progress(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        progress: u8,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?1,
                progress = ?2
            WHERE task_id = ?3
            "#,
        )
        .bind(status.as_str())
        .bind(i64::from(progress.min(100)))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        expect_row(result, task_id)
    }

    /// Record the resolved filename and MIME type once response headers are known.
    /// A missing MIME type is stored as `unknown`.
    pub async fn update_resolved_name(
        &self,
        task_id: &TaskId,
        filename: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET file_name = ?1,
                mime_type = ?2
            WHERE task_id = ?3
            "#,
        )
        .bind(filename)
        .bind(mime_type.unwrap_or(UNKNOWN_MIME_TYPE))
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        expect_row(result, task_id)
    }

    /// Update only the resumable flag.
    pub async fn update_resumable(&self, task_id: &TaskId, resumable: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET resumable = ?1
            WHERE task_id = ?2
            "#,
        )
        .bind(resumable)
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        expect_row(result, task_id)
    }

    /// Move a task lineage to a new attempt id, replacing its state fields and
    /// stamping `time_created`. The row (and its insertion position) is kept.
    pub async fn rotate_id(
        &self,
        old_id: &TaskId,
        new_id: &TaskId,
        status: TaskStatus,
        progress: u8,
        resumable: bool,
    ) -> Result<(), StoreError> {
        let now = unix_timestamp_millis();
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET task_id = ?1,
                status = ?2,
                progress = ?3,
                resumable = ?4,
                time_created = ?5
            WHERE task_id = ?6
            "#,
        )
        .bind(new_id.as_str())
        .bind(status.as_str())
        .bind(i64::from(progress.min(100)))
        .bind(resumable)
        .bind(now)
        .bind(old_id.as_str())
        .execute(&self.pool)
        .await?;
        expect_row(result, old_id)?;
        tracing::debug!(%old_id, %new_id, %status, "task id rotated");
        Ok(())
    }

    /// Normalize any task left in `running` to `enqueued` (e.g. after a crash).
    /// Call before re-admitting work so stranded tasks are picked up again.
    /// Returns the number of tasks reset.
    pub async fn recover_running_tasks(&self) -> Result<u64, StoreError> {
        let r = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'enqueued'
            WHERE status = 'running'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Permanently remove a task row. File cleanup is handled by the engine.
    /// Returns false if no such task existed.
    pub async fn delete(&self, task_id: &TaskId) -> Result<bool, StoreError> {
        let r = sqlx::query(
            r#"
            DELETE FROM tasks
            WHERE task_id = ?1
            "#,
        )
        .bind(task_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }
}
