//! Engine control-surface tests that need no HTTP server.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::events::{Observer, TaskEvent};
use crate::task_db::open_memory;

#[derive(Default)]
struct Recorder(Mutex<Vec<TaskEvent>>);

impl Recorder {
    fn events(&self) -> Vec<TaskEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl Observer for Recorder {
    fn on_task_event(&self, event: &TaskEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

async fn engine() -> (DownloadEngine, TaskDb) {
    let db = open_memory().await.unwrap();
    let cfg = EngineConfig {
        connect_timeout_secs: 2,
        read_timeout_secs: 2,
        ..EngineConfig::default()
    };
    (DownloadEngine::new(db.clone(), &cfg), db)
}

/// Insert a record directly, bypassing admission.
async fn stored(db: &TaskDb, dir: &std::path::Path, status: TaskStatus, resumable: bool) -> TaskRecord {
    let mut record = TaskRecord::new_enqueued(
        TaskId::generate(),
        "http://127.0.0.1:9/data.bin",
        dir,
        Some("data.bin".to_string()),
        BTreeMap::new(),
        TaskOptions::default(),
    );
    record.status = status;
    record.progress = 40;
    record.resumable = resumable;
    db.insert_or_replace(&record).await.unwrap();
    record
}

async fn wait_for_status(engine: &DownloadEngine, id: &TaskId, status: TaskStatus) -> TaskRecord {
    for _ in 0..400 {
        if let Some(record) = engine.get_task(id).await.unwrap() {
            if record.status == status {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {status}");
}

#[tokio::test]
async fn enqueue_rejects_unparsable_url() {
    let (engine, _db) = engine().await;
    let err = engine
        .enqueue(EnqueueRequest::new("not a url", "/tmp"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transfer(TransferError::InvalidUrl { .. })
    ));
    assert!(engine.list_tasks(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_server_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _db) = engine().await;
    let recorder = Arc::new(Recorder::default());
    engine.attach_observer(recorder.clone());

    let id = engine
        .enqueue(EnqueueRequest::new("http://127.0.0.1:9/x.bin", dir.path()))
        .await
        .unwrap();
    let record = wait_for_status(&engine, &id, TaskStatus::Failed).await;
    assert!(!record.resumable);

    let statuses: Vec<TaskStatus> = recorder.events().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![TaskStatus::Enqueued, TaskStatus::Running, TaskStatus::Failed]
    );
    assert!(!dir.path().join("x.bin").exists());
}

#[tokio::test]
async fn events_before_attach_are_buffered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let a = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    let b = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    engine.cancel(&a.task_id).await.unwrap();
    engine.cancel(&b.task_id).await.unwrap();

    let recorder = Arc::new(Recorder::default());
    assert_eq!(engine.attach_observer(recorder.clone()), 2);
    let ids: Vec<TaskId> = recorder.events().into_iter().map(|e| e.task_id).collect();
    assert_eq!(ids, vec![a.task_id, b.task_id]);
}

#[tokio::test]
async fn cancel_of_unadmitted_task_marks_it_canceled() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let record = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    std::fs::write(record.file_path(), b"not ours").unwrap();

    engine.cancel(&record.task_id).await.unwrap();
    let after = engine.get_task(&record.task_id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Canceled);
    assert_eq!(after.progress, 40);
    // A task that never ran does not own the file.
    assert!(record.file_path().exists());
}

#[tokio::test]
async fn pause_of_stranded_running_task_respects_range_proof() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let proven = stored(&db, dir.path(), TaskStatus::Running, true).await;
    let unproven = stored(&db, dir.path(), TaskStatus::Running, false).await;

    engine.pause(&proven.task_id).await.unwrap();
    engine.pause(&unproven.task_id).await.unwrap();

    let proven = engine.get_task(&proven.task_id).await.unwrap().unwrap();
    assert_eq!(proven.status, TaskStatus::Paused);
    assert!(proven.resumable);
    let unproven = engine.get_task(&unproven.task_id).await.unwrap().unwrap();
    assert_eq!(unproven.status, TaskStatus::Canceled);
    assert!(!unproven.resumable);
}

#[tokio::test]
async fn pause_requires_active_task_and_cancel_ignores_settled() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let done = stored(&db, dir.path(), TaskStatus::Complete, false).await;

    let err = engine.pause(&done.task_id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidStatus { .. }));
    engine.cancel(&done.task_id).await.unwrap();
    assert_eq!(
        engine.get_task(&done.task_id).await.unwrap().unwrap().status,
        TaskStatus::Complete
    );

    let missing = TaskId::from("missing");
    assert!(matches!(
        engine.cancel(&missing).await.unwrap_err(),
        EngineError::NotFound(_)
    ));
}

#[tokio::test]
async fn resume_without_partial_data_clears_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let paused = stored(&db, dir.path(), TaskStatus::Paused, true).await;

    let err = engine.resume(&paused.task_id).await.unwrap_err();
    assert!(matches!(err, EngineError::NoPartialData(_)));
    let after = engine.get_task(&paused.task_id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Paused);
    assert!(!after.resumable);
}

#[tokio::test]
async fn resume_and_retry_check_status() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let failed = stored(&db, dir.path(), TaskStatus::Failed, false).await;
    let complete = stored(&db, dir.path(), TaskStatus::Complete, false).await;

    assert!(matches!(
        engine.resume(&failed.task_id).await.unwrap_err(),
        EngineError::InvalidStatus { .. }
    ));
    assert!(matches!(
        engine.retry(&complete.task_id).await.unwrap_err(),
        EngineError::InvalidStatus { .. }
    ));
}

#[tokio::test]
async fn retry_rotates_id_and_restarts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let failed = stored(&db, dir.path(), TaskStatus::Failed, false).await;

    let new_id = engine.retry(&failed.task_id).await.unwrap();
    assert_ne!(new_id, failed.task_id);
    assert!(engine.get_task(&failed.task_id).await.unwrap().is_none());

    // The unreachable URL fails the new attempt again; progress restarted at 0.
    let record = wait_for_status(&engine, &new_id, TaskStatus::Failed).await;
    assert_eq!(record.progress, 0);
    assert_eq!(record.url, failed.url);
    assert_eq!(engine.list_tasks(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn remove_deletes_record_and_optionally_content() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let kept = stored(&db, dir.path(), TaskStatus::Complete, false).await;
    std::fs::write(kept.file_path(), b"payload").unwrap();

    engine.remove(&kept.task_id, false).await.unwrap();
    assert!(engine.get_task(&kept.task_id).await.unwrap().is_none());
    assert!(kept.file_path().exists());

    let mut deleted = stored(&db, dir.path(), TaskStatus::Paused, true).await;
    deleted.filename = Some("partial.bin".to_string());
    db.insert_or_replace(&deleted).await.unwrap();
    std::fs::write(deleted.file_path(), b"part").unwrap();
    engine.remove(&deleted.task_id, true).await.unwrap();
    assert!(!deleted.file_path().exists());
}

#[tokio::test]
async fn start_recovers_stranded_tasks_and_admits_them() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let stranded = stored(&db, dir.path(), TaskStatus::Running, false).await;
    let waiting = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    stored(&db, dir.path(), TaskStatus::Complete, false).await;

    assert_eq!(engine.start().await.unwrap(), 2);
    wait_for_status(&engine, &stranded.task_id, TaskStatus::Failed).await;
    wait_for_status(&engine, &waiting.task_id, TaskStatus::Failed).await;
}

#[tokio::test]
async fn cancel_all_settles_unadmitted_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let a = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    let b = stored(&db, dir.path(), TaskStatus::Running, false).await;
    let paused = stored(&db, dir.path(), TaskStatus::Paused, true).await;

    engine.cancel_all().await.unwrap();
    for id in [&a.task_id, &b.task_id] {
        let record = engine.get_task(id).await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Canceled);
    }
    let paused = engine.get_task(&paused.task_id).await.unwrap().unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
}

#[tokio::test]
async fn throttled_observer_still_sees_final_status() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let record = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<TaskEvent>();
    engine.attach_throttled(tx);

    engine.cancel(&record.task_id).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.task_id, record.task_id);
    assert_eq!(event.status, TaskStatus::Canceled);
}

#[tokio::test]
async fn unadmitted_task_with_proven_partial_pauses_and_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let mut paused = stored(&db, dir.path(), TaskStatus::Enqueued, true).await;
    paused.filename = Some("kept.bin".to_string());
    db.insert_or_replace(&paused).await.unwrap();
    std::fs::write(paused.file_path(), b"partial").unwrap();
    let canceled = stored(&db, dir.path(), TaskStatus::Enqueued, true).await;
    std::fs::write(canceled.file_path(), b"partial").unwrap();

    engine.pause(&paused.task_id).await.unwrap();
    let after = engine.get_task(&paused.task_id).await.unwrap().unwrap();
    assert_eq!((after.status, after.progress), (TaskStatus::Paused, 40));
    assert!(after.resumable);
    assert!(paused.file_path().exists());

    engine.cancel(&canceled.task_id).await.unwrap();
    let after = engine.get_task(&canceled.task_id).await.unwrap().unwrap();
    assert_eq!(after.status, TaskStatus::Canceled);
    assert!(!after.resumable);
    assert!(!canceled.file_path().exists());
}

#[tokio::test]
async fn failed_task_with_proven_partial_can_be_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let failed = stored(&db, dir.path(), TaskStatus::Failed, true).await;
    std::fs::write(failed.file_path(), vec![7u8; 20_000]).unwrap();

    let new_id = engine.resume(&failed.task_id).await.unwrap();
    assert!(engine.get_task(&failed.task_id).await.unwrap().is_none());

    // The unreachable URL fails again, but the proven partial data survives.
    let record = wait_for_status(&engine, &new_id, TaskStatus::Failed).await;
    assert_eq!(record.progress, 40);
    assert!(record.resumable);
    assert_eq!(std::fs::metadata(failed.file_path()).unwrap().len(), 20_000);
}

#[tokio::test]
async fn failed_resumable_task_without_data_reports_no_partial() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    let failed = stored(&db, dir.path(), TaskStatus::Failed, true).await;

    assert!(matches!(
        engine.resume(&failed.task_id).await.unwrap_err(),
        EngineError::NoPartialData(_)
    ));
    assert!(!engine.get_task(&failed.task_id).await.unwrap().unwrap().resumable);
}

#[tokio::test]
async fn unrecordable_running_state_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    sqlx::query(
        "CREATE TRIGGER refuse_running BEFORE UPDATE OF status ON tasks \
         WHEN NEW.status = 'running' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(&db.pool)
    .await
    .unwrap();
    let record = stored(&db, dir.path(), TaskStatus::Enqueued, false).await;
    let recorder = Arc::new(Recorder::default());
    engine.attach_observer(recorder.clone());

    assert_eq!(engine.start().await.unwrap(), 1);
    let after = wait_for_status(&engine, &record.task_id, TaskStatus::Failed).await;
    assert_eq!(after.progress, 40);
    let statuses: Vec<TaskStatus> = recorder.events().iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Failed]);
}

#[tokio::test]
async fn unrecordable_resumable_flag_still_ends_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, db) = engine().await;
    sqlx::query(
        "CREATE TRIGGER refuse_flag BEFORE UPDATE OF resumable ON tasks \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END",
    )
    .execute(&db.pool)
    .await
    .unwrap();
    let record = stored(&db, dir.path(), TaskStatus::Enqueued, true).await;
    std::fs::write(record.file_path(), b"partial").unwrap();

    assert_eq!(engine.start().await.unwrap(), 1);
    let after = wait_for_status(&engine, &record.task_id, TaskStatus::Failed).await;
    assert_eq!(after.progress, 40);
}
