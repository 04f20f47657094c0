//! Task state machine: legal transitions and the interrupt/cleanup policy.
//!
//! `Enqueued → Running → {Complete, Paused, Canceled, Failed}`, and a new
//! attempt (rotated id) from `Paused`, `Failed` or `Canceled` back to
//! `Enqueued`. A queued task that is interrupted before admission goes
//! straight to `Canceled`, or to `Paused` when it carries proven partial
//! data from an earlier attempt. An admitted task whose `Running` state
//! cannot be recorded ends `Failed`.

use crate::control::Interrupt;
use crate::task_db::TaskStatus;

impl TaskStatus {
    /// The attempt is over: no transfer runs and none will run without an
    /// explicit resume/retry.
    pub fn ends_attempt(self) -> bool {
        !self.is_active()
    }

    /// Queued for admission or running.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Enqueued | TaskStatus::Running)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Enqueued, Running)
                | (Enqueued, Paused)
                | (Enqueued, Canceled)
                | (Enqueued, Failed)
                | (Running, Complete)
                | (Running, Paused)
                | (Running, Canceled)
                | (Running, Failed)
                | (Paused, Enqueued)
                | (Failed, Enqueued)
                | (Canceled, Enqueued)
        )
    }

    /// Can a new attempt be started with `retry`?
    pub fn is_retryable(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Canceled)
    }
}

/// Status of a running attempt that stopped because of an external interrupt.
///
/// Pausing only yields `Paused` when range support has been proven (by this
/// attempt or a prior one); resumability is never assumed.
pub fn interrupted_status(intent: Interrupt, range_proven: bool) -> TaskStatus {
    match (intent, range_proven) {
        (Interrupt::Pause, true) => TaskStatus::Paused,
        _ => TaskStatus::Canceled,
    }
}

/// Whether partial data on disk must be kept after an attempt ends in `status`.
pub fn keeps_partial(status: TaskStatus, resumable: bool) -> bool {
    match status {
        TaskStatus::Complete | TaskStatus::Paused => true,
        TaskStatus::Canceled | TaskStatus::Failed => resumable,
        TaskStatus::Enqueued | TaskStatus::Running => true,
    }
}

/// `resumable` flag recorded when an attempt ends in `status`.
///
/// A pause always leaves resumable data; a cancel never keeps it. Otherwise
/// the attempt's own range proof decides.
pub fn settled_resumable(status: TaskStatus, range_proven: bool) -> bool {
    match status {
        TaskStatus::Paused => true,
        TaskStatus::Canceled => false,
        _ => range_proven,
    }
}
