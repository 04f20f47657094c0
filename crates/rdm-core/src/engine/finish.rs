//! Final status of an attempt and cleanup of its partial data.

use std::path::Path;

use tokio::task::JoinError;

use super::execute::AttemptState;
use super::{check_transition, EngineInner};
use crate::control::{AbortToken, Interrupt};
use crate::error::EngineError;
use crate::lifecycle::{interrupted_status, keeps_partial, settled_resumable};
use crate::storage;
use crate::task_db::{StoreError, TaskId, TaskRecord, TaskStatus};
use crate::transfer::{ErrorKind, TransferError, TransferOutcome};

/// Record how a running attempt ended: resumable flag, status and progress
/// (store first), then the final event, then cleanup.
pub(super) async fn settle(
    inner: &EngineInner,
    record: &TaskRecord,
    token: &AbortToken,
    state: AttemptState,
    joined: Result<Result<TransferOutcome, TransferError>, JoinError>,
) -> Result<(), EngineError> {
    let task_id = &record.task_id;
    let AttemptState {
        progress,
        range_proven,
        owns_file,
        path,
        store_failure,
    } = state;

    let (status, progress) = match (&store_failure, joined) {
        (Some(e), _) => {
            tracing::error!(%task_id, "attempt failed on task store: {}", e);
            (TaskStatus::Failed, progress)
        }
        (None, Err(e)) => {
            tracing::error!(%task_id, "transfer worker failed: {}", e);
            (TaskStatus::Failed, progress)
        }
        (None, Ok(Ok(outcome))) => {
            tracing::info!(
                %task_id,
                path = %outcome.path.display(),
                bytes = outcome.total_bytes,
                restarted = outcome.restarted,
                "task complete"
            );
            (TaskStatus::Complete, 100)
        }
        (None, Ok(Err(e))) if e.kind() == ErrorKind::Interrupted => {
            let intent = token.intent().unwrap_or(Interrupt::Cancel);
            let status = interrupted_status(intent, range_proven);
            tracing::info!(%task_id, ?intent, %status, progress, "task interrupted");
            (status, progress)
        }
        (None, Ok(Err(e))) => {
            tracing::warn!(%task_id, kind = ?e.kind(), progress, "task failed: {}", e);
            (TaskStatus::Failed, progress)
        }
    };

    let resumable = settled_resumable(status, range_proven);
    check_transition(task_id, TaskStatus::Running, status)?;
    let flag = (resumable != record.resumable || owns_file).then_some(resumable);
    let written = write_outcome(inner, task_id, status, progress, flag).await?;

    if owns_file && written == status && !keeps_partial(status, resumable) {
        remove_partial(record, &path);
    }
    Ok(())
}

/// Stop a task before admission. The only data on disk that belongs to it is
/// partial data of an earlier range-proven attempt: a pause keeps it, a
/// cancel discards it. Without such data the destination is left untouched.
pub(super) async fn interrupt_queued(
    inner: &EngineInner,
    record: &TaskRecord,
    intent: Interrupt,
) -> Result<(), EngineError> {
    let task_id = &record.task_id;
    let path = record.file_path();
    let carried = record.resumable && storage::has_partial(&path).unwrap_or(false);
    let status = interrupted_status(intent, carried);
    let resumable = settled_resumable(status, carried);
    check_transition(task_id, record.status, status)?;
    let flag = (resumable != record.resumable).then_some(resumable);
    let written = write_outcome(inner, task_id, status, record.progress, flag).await?;
    tracing::info!(%task_id, ?intent, status = %written, "queued task stopped");

    if carried && written == status && !keeps_partial(status, resumable) {
        remove_partial(record, &path);
    }
    Ok(())
}

/// Settle a task recorded as `running` that no attempt in this process owns,
/// e.g. one stranded by a crash before `start` recovered it.
pub(super) async fn settle_untracked(
    inner: &EngineInner,
    record: &TaskRecord,
    intent: Interrupt,
) -> Result<(), EngineError> {
    let task_id = &record.task_id;
    let status = interrupted_status(intent, record.resumable);
    let resumable = settled_resumable(status, record.resumable);
    check_transition(task_id, record.status, status)?;
    let written = write_outcome(inner, task_id, status, record.progress, Some(resumable)).await?;
    tracing::info!(%task_id, ?intent, status = %written, "untracked running task settled");
    if written == status && !keeps_partial(status, resumable) {
        remove_partial(record, &record.file_path());
    }
    Ok(())
}

/// An admitted task whose `running` state could not be recorded: record it
/// `failed` with its last progress and hand the store error back.
pub(super) async fn fail_unstarted(
    inner: &EngineInner,
    record: &TaskRecord,
    cause: StoreError,
) -> Result<(), EngineError> {
    let task_id = &record.task_id;
    tracing::error!(%task_id, "recording running state failed: {}", cause);
    check_transition(task_id, record.status, TaskStatus::Failed)?;
    write_outcome(inner, task_id, TaskStatus::Failed, record.progress, None).await?;
    Err(cause.into())
}

/// Write the resumable flag (when given), then the status, then emit. A failed
/// flag write turns the outcome into `Failed`, which is still recorded so the
/// task never stays active. Returns the status actually written.
async fn write_outcome(
    inner: &EngineInner,
    task_id: &TaskId,
    status: TaskStatus,
    progress: u8,
    resumable: Option<bool>,
) -> Result<TaskStatus, EngineError> {
    let mut status = status;
    if let Some(resumable) = resumable {
        if let Err(e) = inner.db.update_resumable(task_id, resumable).await {
            tracing::error!(%task_id, "recording resumable flag failed, marking task failed: {}", e);
            status = TaskStatus::Failed;
        }
    }
    inner
        .db
        .update_status_progress(task_id, status, progress)
        .await?;
    inner.emit(task_id, status, progress);
    Ok(status)
}

fn remove_partial(record: &TaskRecord, path: &Path) {
    match storage::discard(path) {
        Ok(true) => {
            tracing::debug!(task_id = %record.task_id, path = %path.display(), "partial data removed")
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(task_id = %record.task_id, path = %path.display(), "removing partial data failed: {}", e)
        }
    }
}
