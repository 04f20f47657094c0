//! One admitted attempt: mark it running, drive the transfer, record what it
//! reports, then settle the final status.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{check_transition, finish, EngineInner};
use crate::control::{AbortToken, Interrupt};
use crate::error::EngineError;
use crate::storage;
use crate::task_db::{StoreError, TaskId, TaskRecord, TaskStatus};
use crate::transfer::{self, TransferRequest, TransferUpdate};

/// What the engine learned while the transfer ran.
pub(super) struct AttemptState {
    pub(super) progress: u8,
    /// Range support as currently known: the stored proof of the partial data
    /// being continued until this attempt gets a response, then that response's.
    pub(super) range_proven: bool,
    /// The attempt created or appended to the destination file.
    pub(super) owns_file: bool,
    pub(super) path: PathBuf,
    pub(super) store_failure: Option<StoreError>,
}

/// Entry point of a controller job. Errors are logged; the attempt always
/// releases its slot.
pub(super) async fn run_attempt(inner: Arc<EngineInner>, task_id: TaskId, token: Arc<AbortToken>) {
    if let Err(e) = attempt(&inner, &task_id, token).await {
        tracing::error!(%task_id, "attempt could not be recorded: {}", e);
    }
}

async fn attempt(
    inner: &EngineInner,
    task_id: &TaskId,
    token: Arc<AbortToken>,
) -> Result<(), EngineError> {
    let Some(record) = inner.db.get(task_id).await? else {
        tracing::debug!(%task_id, "admitted task no longer exists");
        return Ok(());
    };
    if record.status != TaskStatus::Enqueued {
        tracing::debug!(%task_id, status = %record.status, "admitted task is not enqueued, skipping");
        return Ok(());
    }

    let resume_from = resume_offset(&record);
    let progress = if resume_from > 0 { record.progress } else { 0 };
    check_transition(task_id, record.status, TaskStatus::Running)?;
    if let Err(e) = inner
        .db
        .update_status_progress(task_id, TaskStatus::Running, progress)
        .await
    {
        return finish::fail_unstarted(inner, &record, e).await;
    }
    inner.emit(task_id, TaskStatus::Running, progress);
    tracing::info!(%task_id, url = %record.url, resume_from, "task running");

    let req = TransferRequest {
        url: record.url.clone(),
        saved_dir: record.saved_dir.clone(),
        filename: record.filename.clone(),
        headers: record.headers.clone(),
        resume_from,
        options: inner.transfer.clone(),
    };
    let mut state = AttemptState {
        progress,
        range_proven: record.resumable && resume_from > 0,
        owns_file: resume_from > 0,
        path: record.file_path(),
        store_failure: None,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = transfer::spawn_transfer(req.clone(), Arc::clone(&token), tx);
    while let Some(update) = rx.recv().await {
        if state.store_failure.is_some() {
            // Draining until the transfer notices the cancel.
            continue;
        }
        if let Err(e) = apply_update(inner, task_id, &record, &req, &mut state, update).await {
            tracing::warn!(%task_id, "store update failed, stopping attempt: {}", e);
            state.store_failure = Some(e);
            token.request(Interrupt::Cancel);
        }
    }

    finish::settle(inner, &record, &token, state, handle.await).await
}

/// Offset to continue from: the partial length when the record is resumable
/// and its data is still on disk, else 0.
fn resume_offset(record: &TaskRecord) -> u64 {
    if !record.resumable {
        return 0;
    }
    let path = record.file_path();
    match storage::partial_len(&path) {
        Ok(Some(len)) => len,
        Ok(None) => {
            tracing::warn!(task_id = %record.task_id, path = %path.display(), "partial data missing, starting over");
            0
        }
        Err(e) => {
            tracing::warn!(task_id = %record.task_id, path = %path.display(), "cannot inspect partial data, starting over: {}", e);
            0
        }
    }
}

/// Record one transfer update, store first, then emit.
async fn apply_update(
    inner: &EngineInner,
    task_id: &TaskId,
    record: &TaskRecord,
    req: &TransferRequest,
    state: &mut AttemptState,
    update: TransferUpdate,
) -> Result<(), StoreError> {
    match update {
        TransferUpdate::Responded {
            range_proven,
            restarted,
        } => {
            state.owns_file = true;
            state.range_proven = range_proven;
            if restarted {
                tracing::info!(%task_id, "server ignored range request, restarting");
            }
            inner.db.update_resumable(task_id, range_proven).await?;
        }
        TransferUpdate::Resolved {
            filename,
            mime_type,
        } => {
            let filename = filename.or_else(|| record.filename.clone());
            state.path = req.destination(filename.as_deref());
            inner
                .db
                .update_resolved_name(task_id, filename.as_deref(), mime_type.as_deref())
                .await?;
            tracing::debug!(%task_id, path = %state.path.display(), "destination resolved");
        }
        TransferUpdate::Progress(p) => {
            // Never report less than what observers have already seen.
            if p <= state.progress {
                return Ok(());
            }
            state.progress = p;
            inner
                .db
                .update_status_progress(task_id, TaskStatus::Running, p)
                .await?;
            inner.emit(task_id, TaskStatus::Running, p);
        }
    }
    Ok(())
}
