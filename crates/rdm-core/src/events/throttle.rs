//! Rate limiting of progress events for slow sinks.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{Observer, TaskEvent};
use crate::task_db::{TaskId, TaskStatus};

/// Default interval between forwarded progress events of one task.
pub const DEFAULT_NOTIFICATION_INTERVAL_MS: u64 = 1000;

struct LastForwarded {
    at: Instant,
    status: TaskStatus,
}

/// Wraps an observer and drops `Running` progress events that arrive within
/// `interval` of the previous forwarded event for the same task. Status
/// changes and every event that ends an attempt are always forwarded.
pub struct ThrottledObserver<O> {
    inner: O,
    interval: Duration,
    last: Mutex<HashMap<TaskId, LastForwarded>>,
}

impl<O: Observer> ThrottledObserver<O> {
    pub fn new(inner: O, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_millis(inner: O, interval_ms: u64) -> Self {
        Self::new(inner, Duration::from_millis(interval_ms))
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    fn should_forward(&self, event: &TaskEvent, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if event.status.ends_attempt() {
            last.remove(&event.task_id);
            return true;
        }
        let forward = match last.get(&event.task_id) {
            None => true,
            Some(prev) if prev.status != event.status => true,
            Some(_) if event.status != TaskStatus::Running => true,
            Some(prev) => now.duration_since(prev.at) >= self.interval,
        };
        if forward {
            last.insert(
                event.task_id.clone(),
                LastForwarded {
                    at: now,
                    status: event.status,
                },
            );
        }
        forward
    }
}

impl<O: Observer> Observer for ThrottledObserver<O> {
    fn on_task_event(&self, event: &TaskEvent) {
        if self.should_forward(event, Instant::now()) {
            self.inner.on_task_event(event);
        }
    }
}
