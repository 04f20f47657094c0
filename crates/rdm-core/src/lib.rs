//! Resumable download task engine with a durable task store.

pub mod config;
pub mod logging;

pub mod control;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod scheduler;
pub mod storage;
pub mod task_db;
pub mod transfer;
pub mod url_model;

pub use engine::{DownloadEngine, EnqueueRequest};
pub use error::EngineError;
pub use events::{Observer, TaskEvent};
pub use task_db::{TaskDb, TaskFilter, TaskId, TaskRecord, TaskStatus};
