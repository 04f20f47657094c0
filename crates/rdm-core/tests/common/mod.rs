//! Shared helpers for engine integration tests.

#![allow(dead_code)]

pub mod test_server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdm_core::config::EngineConfig;
use rdm_core::{DownloadEngine, Observer, TaskDb, TaskEvent, TaskId, TaskRecord, TaskStatus};
use tempfile::TempDir;

/// Engine over a fresh on-disk task database, plus the download directory.
pub struct Harness {
    pub engine: DownloadEngine,
    pub db: TaskDb,
    pub downloads: TempDir,
    _state: TempDir,
}

pub async fn harness(max_concurrent_tasks: usize) -> Harness {
    let state = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let db = TaskDb::open_at(state.path().join("tasks.db")).await.unwrap();
    let cfg = EngineConfig {
        max_concurrent_tasks,
        connect_timeout_secs: 5,
        read_timeout_secs: 5,
        ..EngineConfig::default()
    };
    Harness {
        engine: DownloadEngine::new(db.clone(), &cfg),
        db,
        downloads,
        _state: state,
    }
}

/// Body whose bytes encode their offset, so misplaced data is detectable.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
pub struct Recorder(Mutex<Vec<TaskEvent>>);

impl Recorder {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn events_for(&self, id: &TaskId) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|e| &e.task_id == id)
            .collect()
    }
}

impl Observer for Recorder {
    fn on_task_event(&self, event: &TaskEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

pub fn attach_recorder(engine: &DownloadEngine) -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::default());
    engine.attach_observer(recorder.clone());
    recorder
}

/// Poll the store until `cond` holds for the task, or panic after ~10s.
pub async fn wait_for(
    engine: &DownloadEngine,
    id: &TaskId,
    what: &str,
    mut cond: impl FnMut(&TaskRecord) -> bool,
) -> TaskRecord {
    for _ in 0..1000 {
        if let Some(record) = engine.get_task(id).await.unwrap() {
            if cond(&record) {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached: {}", id, what);
}

pub async fn wait_for_status(engine: &DownloadEngine, id: &TaskId, status: TaskStatus) -> TaskRecord {
    wait_for(engine, id, status.as_str(), |r| r.status == status).await
}

/// Wait until no attempt holds a slot, i.e. every final event has been emitted.
pub async fn wait_idle(engine: &DownloadEngine) {
    for _ in 0..1000 {
        if engine.running_count() == 0 && engine.queued_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine never became idle");
}
