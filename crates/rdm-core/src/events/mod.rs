//! Task events and their delivery to an observer.
//!
//! The engine emits one [`TaskEvent`] per status transition and per sampled
//! progress step. [`EventEmitter`] buffers events until an observer attaches;
//! [`ThrottledObserver`] rate-limits progress for sinks such as UI notifications.

mod emitter;
mod throttle;

pub use emitter::EventEmitter;
pub use throttle::{ThrottledObserver, DEFAULT_NOTIFICATION_INTERVAL_MS};

use crate::task_db::{TaskId, TaskStatus};

/// `(task id, status, progress)` as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, status: TaskStatus, progress: u8) -> Self {
        Self {
            task_id,
            status,
            progress,
        }
    }
}

/// Receives task events. Called synchronously from engine tasks, so
/// implementations must not block for long.
pub trait Observer: Send + Sync {
    fn on_task_event(&self, event: &TaskEvent);
}

impl Observer for tokio::sync::mpsc::UnboundedSender<TaskEvent> {
    fn on_task_event(&self, event: &TaskEvent) {
        // Delivery is best-effort; a closed receiver just stops listening.
        let _ = self.send(event.clone());
    }
}
