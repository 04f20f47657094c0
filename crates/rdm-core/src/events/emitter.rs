//! Ordered event delivery with buffering until an observer is attached.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use super::{Observer, TaskEvent};

#[derive(Default)]
struct Inner {
    observer: Option<Arc<dyn Observer>>,
    pending: VecDeque<TaskEvent>,
}

/// Process-scoped event channel owned by the engine.
///
/// Events emitted while no observer is attached are kept, in order, in an
/// unbounded buffer and flushed to the next observer that attaches. Delivery
/// happens under the emitter lock, so observers see events in emission order.
#[derive(Default)]
pub struct EventEmitter {
    inner: Mutex<Inner>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: TaskEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match &inner.observer {
            Some(observer) => observer.on_task_event(&event),
            None => inner.pending.push_back(event),
        }
    }

    /// Attach `observer`, replacing any previous one, and flush buffered events to it.
    /// Returns how many buffered events were delivered.
    pub fn attach(&self, observer: Arc<dyn Observer>) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = std::mem::take(&mut inner.pending);
        let flushed = pending.len();
        for event in &pending {
            observer.on_task_event(event);
        }
        inner.observer = Some(observer);
        if flushed > 0 {
            tracing::debug!(flushed, "delivered buffered task events");
        }
        flushed
    }

    /// Detach the current observer; later events are buffered again.
    pub fn detach(&self) -> Option<Arc<dyn Observer>> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.observer.take()
    }

    /// Number of events waiting for an observer.
    pub fn pending_len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}
