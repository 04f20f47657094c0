//! Download task engine: the control surface over the task store, the
//! concurrency controller, the transfer protocol and the event emitter.
//!
//! Every status change is written to the store before its event is emitted,
//! so an observer never sees a state the store does not hold.

mod execute;
mod finish;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::control::Interrupt;
use crate::error::EngineError;
use crate::events::{EventEmitter, Observer, TaskEvent, ThrottledObserver};
use crate::scheduler::{job, Controller};
use crate::storage;
use crate::task_db::{TaskDb, TaskFilter, TaskId, TaskOptions, TaskRecord, TaskStatus};
use crate::transfer::{TransferError, TransferOptions};

/// Parameters of a new download.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub url: String,
    pub saved_dir: PathBuf,
    /// Destination name; `None` resolves it from the response.
    pub filename: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub options: TaskOptions,
}

impl EnqueueRequest {
    pub fn new(url: impl Into<String>, saved_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            saved_dir: saved_dir.into(),
            filename: None,
            headers: BTreeMap::new(),
            options: TaskOptions::default(),
        }
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }
}

pub(crate) struct EngineInner {
    pub(crate) db: TaskDb,
    pub(crate) events: EventEmitter,
    pub(crate) controller: Controller,
    pub(crate) transfer: TransferOptions,
    pub(crate) notification_interval: Duration,
}

impl EngineInner {
    pub(crate) fn emit(&self, task_id: &TaskId, status: TaskStatus, progress: u8) {
        self.events
            .emit(TaskEvent::new(task_id.clone(), status, progress));
    }
}

/// Reject status writes the state machine does not allow.
pub(crate) fn check_transition(
    id: &TaskId,
    from: TaskStatus,
    to: TaskStatus,
) -> Result<(), EngineError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::IllegalTransition {
            id: id.clone(),
            from,
            to,
        })
    }
}

/// Cheap to clone; clones share the same store, queue and observer.
#[derive(Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

impl DownloadEngine {
    /// Build an engine over `db`. Nothing runs until [`start`](Self::start)
    /// or [`enqueue`](Self::enqueue) is called.
    pub fn new(db: TaskDb, cfg: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                db,
                events: EventEmitter::new(),
                controller: Controller::new(cfg.max_concurrent_tasks),
                transfer: cfg.transfer_options(),
                notification_interval: Duration::from_millis(cfg.notification_interval_ms),
            }),
        }
    }

    /// Recover tasks stranded in `running` by a previous process and admit
    /// every `enqueued` task in insertion order. Returns how many were admitted.
    pub async fn start(&self) -> Result<usize, EngineError> {
        let recovered = self.inner.db.recover_running_tasks().await?;
        if recovered > 0 {
            tracing::info!(recovered, "reset interrupted tasks to enqueued");
        }
        let pending = self
            .inner
            .db
            .query(&TaskFilter::with_statuses([TaskStatus::Enqueued]))
            .await?;
        let mut admitted = 0;
        for record in pending {
            let controller = &self.inner.controller;
            if controller.is_running(&record.task_id) || controller.is_queued(&record.task_id) {
                continue;
            }
            self.admit(record.task_id);
            admitted += 1;
        }
        tracing::info!(admitted, "engine started");
        Ok(admitted)
    }

    fn admit(&self, task_id: TaskId) {
        let inner = Arc::clone(&self.inner);
        let id = task_id.clone();
        self.inner.controller.submit(
            task_id,
            job(move |token| execute::run_attempt(inner, id, token)),
        );
    }

    /// Persist a new task and queue it for admission.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<TaskId, EngineError> {
        url::Url::parse(&req.url).map_err(|_| TransferError::InvalidUrl {
            url: req.url.clone(),
        })?;
        let filename = req.filename.filter(|name| !name.trim().is_empty());
        let task_id = TaskId::generate();
        let record = TaskRecord::new_enqueued(
            task_id.clone(),
            req.url,
            req.saved_dir,
            filename,
            req.headers,
            req.options,
        );
        self.inner.db.insert_or_replace(&record).await?;
        tracing::info!(%task_id, url = %record.url, "task enqueued");
        self.inner.emit(&task_id, TaskStatus::Enqueued, 0);
        self.admit(task_id.clone());
        Ok(task_id)
    }

    /// Stop a queued or running task, keeping its partial data when the
    /// server has proven range support. Returns once the task has settled.
    pub async fn pause(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let record = self.require(task_id).await?;
        if !record.status.is_active() {
            return Err(EngineError::InvalidStatus {
                id: task_id.clone(),
                status: record.status,
                expected: "enqueued or running",
            });
        }
        self.interrupt(record, Interrupt::Pause).await
    }

    /// Stop a queued or running task for good. A task that is neither is left alone.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let record = self.require(task_id).await?;
        if !record.status.is_active() {
            tracing::debug!(%task_id, status = %record.status, "cancel ignored");
            return Ok(());
        }
        self.interrupt(record, Interrupt::Cancel).await
    }

    async fn interrupt(&self, record: TaskRecord, intent: Interrupt) -> Result<(), EngineError> {
        let task_id = &record.task_id;
        let controller = &self.inner.controller;
        if controller.dequeue(task_id) {
            return finish::interrupt_queued(&self.inner, &record, intent).await;
        }
        if controller.interrupt(task_id, intent).await {
            tracing::info!(%task_id, ?intent, "running task interrupted");
            return Ok(());
        }
        // Neither queued nor running here: not admitted yet (engine not
        // started) or stranded by a dead process.
        let Some(current) = self.inner.db.get(task_id).await? else {
            return Ok(());
        };
        match current.status {
            TaskStatus::Enqueued => finish::interrupt_queued(&self.inner, &current, intent).await,
            TaskStatus::Running => finish::settle_untracked(&self.inner, &current, intent).await,
            _ => Ok(()),
        }
    }

    /// Cancel every queued and running task. Returns once all have settled.
    pub async fn cancel_all(&self) -> Result<(), EngineError> {
        let controller = &self.inner.controller;
        for task_id in controller.drain_queue() {
            if let Some(record) = self.inner.db.get(&task_id).await? {
                if record.status == TaskStatus::Enqueued {
                    finish::interrupt_queued(&self.inner, &record, Interrupt::Cancel).await?;
                }
            }
        }
        let stopped = controller.interrupt_all(Interrupt::Cancel).await;
        let stranded = self
            .inner
            .db
            .query(&TaskFilter::with_statuses([
                TaskStatus::Enqueued,
                TaskStatus::Running,
            ]))
            .await?;
        for record in stranded {
            if controller.is_running(&record.task_id) || controller.is_queued(&record.task_id) {
                continue;
            }
            match record.status {
                TaskStatus::Enqueued => {
                    finish::interrupt_queued(&self.inner, &record, Interrupt::Cancel).await?
                }
                _ => finish::settle_untracked(&self.inner, &record, Interrupt::Cancel).await?,
            }
        }
        tracing::info!(stopped = stopped.len(), "all tasks canceled");
        Ok(())
    }

    /// Continue a paused task, or a failed one whose partial data is proven
    /// resumable, from that data under a new task id.
    pub async fn resume(&self, task_id: &TaskId) -> Result<TaskId, EngineError> {
        let record = self.require(task_id).await?;
        let continuable = match record.status {
            TaskStatus::Paused => true,
            TaskStatus::Failed => record.resumable,
            _ => false,
        };
        if !continuable {
            return Err(EngineError::InvalidStatus {
                id: task_id.clone(),
                status: record.status,
                expected: "paused, or failed with resumable data",
            });
        }
        if !record.resumable || !self.has_partial(&record)? {
            tracing::warn!(%task_id, path = %record.file_path().display(), "no partial data to resume from");
            self.inner.db.update_resumable(task_id, false).await?;
            return Err(EngineError::NoPartialData(task_id.clone()));
        }

        let new_id = self.new_attempt(&record, record.progress, true).await?;
        tracing::info!(old_id = %task_id, %new_id, "task resumed");
        Ok(new_id)
    }

    /// Start a failed or canceled task again under a new task id. A failed
    /// task with proven partial data continues from it; anything else starts
    /// over from byte 0.
    pub async fn retry(&self, task_id: &TaskId) -> Result<TaskId, EngineError> {
        let record = self.require(task_id).await?;
        if !record.status.is_retryable() {
            return Err(EngineError::InvalidStatus {
                id: task_id.clone(),
                status: record.status,
                expected: "failed or canceled",
            });
        }
        let continues = record.status == TaskStatus::Failed
            && record.resumable
            && self.has_partial(&record)?;
        let new_id = if continues {
            self.new_attempt(&record, record.progress, true).await?
        } else {
            self.new_attempt(&record, 0, false).await?
        };
        tracing::info!(old_id = %task_id, %new_id, continues, "task retried");
        Ok(new_id)
    }

    /// Rotate the lineage to a fresh `enqueued` attempt and admit it.
    async fn new_attempt(
        &self,
        record: &TaskRecord,
        progress: u8,
        resumable: bool,
    ) -> Result<TaskId, EngineError> {
        check_transition(&record.task_id, record.status, TaskStatus::Enqueued)?;
        let new_id = TaskId::generate();
        self.inner
            .db
            .rotate_id(&record.task_id, &new_id, TaskStatus::Enqueued, progress, resumable)
            .await?;
        self.inner.emit(&new_id, TaskStatus::Enqueued, progress);
        self.admit(new_id.clone());
        Ok(new_id)
    }

    fn has_partial(&self, record: &TaskRecord) -> Result<bool, EngineError> {
        let path = record.file_path();
        storage::has_partial(&path).map_err(|e| EngineError::filesystem(&path, e))
    }

    /// Forget a task, canceling it first if it is active. With
    /// `delete_content`, its file (partial or complete) is removed too.
    pub async fn remove(&self, task_id: &TaskId, delete_content: bool) -> Result<(), EngineError> {
        let mut record = self.require(task_id).await?;
        if record.status.is_active() {
            self.cancel(task_id).await?;
            // The attempt may have resolved a filename before it stopped.
            if let Some(settled) = self.inner.db.get(task_id).await? {
                record = settled;
            }
        }
        self.inner.db.delete(task_id).await?;
        let path = record.file_path();
        if delete_content {
            let removed =
                storage::discard(&path).map_err(|e| EngineError::filesystem(&path, e))?;
            tracing::info!(%task_id, path = %path.display(), removed, "task removed with content");
        } else {
            tracing::info!(%task_id, "task removed");
        }
        Ok(())
    }

    /// Every task in insertion order, or those matching `filter`.
    pub async fn list_tasks(
        &self,
        filter: Option<&TaskFilter>,
    ) -> Result<Vec<TaskRecord>, EngineError> {
        let tasks = match filter {
            Some(filter) => self.inner.db.query(filter).await?,
            None => self.inner.db.list_all().await?,
        };
        Ok(tasks)
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, EngineError> {
        Ok(self.inner.db.get(task_id).await?)
    }

    async fn require(&self, task_id: &TaskId) -> Result<TaskRecord, EngineError> {
        self.inner
            .db
            .get(task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.clone()))
    }

    /// Attach the observer, replacing any previous one. Events emitted while
    /// none was attached are delivered to it first, in order.
    pub fn attach_observer(&self, observer: Arc<dyn Observer>) -> usize {
        self.inner.events.attach(observer)
    }

    /// Like [`attach_observer`](Self::attach_observer), rate-limiting progress
    /// events to the configured `notification_interval_ms` per task.
    pub fn attach_throttled<O: Observer + 'static>(&self, observer: O) -> usize {
        let throttled = ThrottledObserver::new(observer, self.inner.notification_interval);
        self.inner.events.attach(Arc::new(throttled))
    }

    /// Detach the observer; later events are buffered until the next attach.
    pub fn detach_observer(&self) -> Option<Arc<dyn Observer>> {
        self.inner.events.detach()
    }

    /// Attempts currently holding a concurrency slot.
    pub fn running_count(&self) -> usize {
        self.inner.controller.running_count()
    }

    /// Tasks waiting for a free slot.
    pub fn queued_count(&self) -> usize {
        self.inner.controller.queued_count()
    }
}

#[cfg(test)]
mod tests;
