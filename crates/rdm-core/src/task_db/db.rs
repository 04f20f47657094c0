//! SQLite-backed task database implementation.
//!
//! Handles connection, migrations, and timestamp helpers. Task CRUD lives in `tasks`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::error::StoreError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Columns added after the first schema, applied in order and tracked with
/// `PRAGMA user_version`. Only ever append: each entry must be additive.
const MIGRATIONS: &[&str] = &[
    "ALTER TABLE tasks ADD COLUMN save_in_public_storage INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE tasks ADD COLUMN allow_cellular INTEGER NOT NULL DEFAULT 1",
];

/// Handle to the SQLite-backed task database.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/rdm/tasks.db` on Debian.
#[derive(Clone)]
pub struct TaskDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl TaskDb {
    /// Open (or create) the default task database and run migrations.
    pub async fn open_default() -> Result<Self, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")?;
        let db_path = xdg_dirs.get_state_home().join("tasks.db");
        Self::open_at(db_path).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::from_str(&path_to_sqlite_uri(path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let db = TaskDb { pool };
        db.migrate().await?;
        tracing::debug!(path = %path.display(), "task database opened");
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        // Base schema (version 0). `id` keeps insertion order across task_id rotation.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                file_name TEXT,
                saved_dir TEXT NOT NULL,
                headers TEXT NOT NULL DEFAULT '{}',
                mime_type TEXT NOT NULL DEFAULT 'unknown',
                resumable INTEGER NOT NULL DEFAULT 0,
                show_notification INTEGER NOT NULL DEFAULT 0,
                open_file_from_notification INTEGER NOT NULL DEFAULT 0,
                time_created INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        let applied = usize::try_from(version).unwrap_or(0);

        for (index, statement) in MIGRATIONS.iter().enumerate().skip(applied) {
            let mut tx = self.pool.begin().await?;
            sqlx::query(statement).execute(&mut *tx).await?;
            // PRAGMA does not accept bound parameters.
            sqlx::query(&format!("PRAGMA user_version = {}", index + 1))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!(version = index + 1, "task schema migrated");
        }

        Ok(())
    }
}

/// Current time as Unix milliseconds (for `time_created`).
pub(crate) fn unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<TaskDb, StoreError> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = TaskDb { pool };
    db.migrate().await?;
    Ok(db)
}

#[cfg(test)]
/// Open an in-memory database that only carries the base schema, as a
/// database created by the first release would.
pub(crate) async fn open_memory_unmigrated() -> Result<TaskDb, StoreError> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(TaskDb { pool })
}

#[cfg(test)]
impl TaskDb {
    pub(crate) async fn run_migrations(&self) -> Result<(), StoreError> {
        self.migrate().await
    }
}
