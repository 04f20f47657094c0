//! RAII guard that frees an admission slot when an attempt ends.

use tokio::sync::watch;

use super::controller::Controller;
use crate::task_db::TaskId;

/// Held by the spawned attempt. Dropping it (normal return, error or panic)
/// frees the slot, wakes waiters in `interrupt` and admits the next queued task.
pub(super) struct SlotGuard {
    pub(super) controller: Controller,
    pub(super) task_id: TaskId,
    pub(super) done: watch::Sender<bool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.controller.finish(&self.task_id);
        let _ = self.done.send(true);
        self.controller.pump();
    }
}
