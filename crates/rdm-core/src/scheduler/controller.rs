//! Bounded FIFO admission of attempts.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::guard::SlotGuard;
use crate::control::{AbortToken, Interrupt};
use crate::task_db::TaskId;

/// Future of one admitted attempt.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Work submitted for admission. Receives the attempt's abort token.
pub type Job = Box<dyn FnOnce(Arc<AbortToken>) -> JobFuture + Send>;

/// Box an async closure as a [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: FnOnce(Arc<AbortToken>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |token: Arc<AbortToken>| -> JobFuture { Box::pin(f(token)) })
}

struct Running {
    token: Arc<AbortToken>,
    done: watch::Receiver<bool>,
}

struct State {
    limit: usize,
    queue: VecDeque<(TaskId, Job)>,
    running: HashMap<TaskId, Running>,
}

/// Admits queued attempts in FIFO order while fewer than `limit` run.
///
/// Each admitted attempt runs in its own tokio task; a panic or error in one
/// never affects the others. Cloning shares the same queue and slots.
#[derive(Clone)]
pub struct Controller {
    state: Arc<Mutex<State>>,
}

impl Controller {
    /// `limit` is clamped to at least 1.
    pub fn new(limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                limit: limit.max(1),
                queue: VecDeque::new(),
                running: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `job` under `task_id` and admit as many queued jobs as capacity allows.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, task_id: TaskId, job: Job) {
        self.lock().queue.push_back((task_id, job));
        self.pump();
    }

    /// Admit queued jobs while capacity is free.
    pub(super) fn pump(&self) {
        loop {
            let (task_id, job, token, done_tx) = {
                let mut state = self.lock();
                if state.running.len() >= state.limit {
                    return;
                }
                let Some((task_id, job)) = state.queue.pop_front() else {
                    return;
                };
                let token = Arc::new(AbortToken::new());
                let (done_tx, done_rx) = watch::channel(false);
                state.running.insert(
                    task_id.clone(),
                    Running {
                        token: Arc::clone(&token),
                        done: done_rx,
                    },
                );
                (task_id, job, token, done_tx)
            };

            let handle = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle,
                Err(_) => {
                    // Runtime is gone (shutdown); the job can never run.
                    tracing::warn!(%task_id, "no runtime to admit task");
                    self.finish(&task_id);
                    return;
                }
            };
            tracing::debug!(%task_id, "task admitted");
            let guard = SlotGuard {
                controller: self.clone(),
                task_id,
                done: done_tx,
            };
            handle.spawn(async move {
                let _guard = guard;
                job(token).await;
            });
        }
    }

    /// Release the running slot of `task_id`.
    pub(super) fn finish(&self, task_id: &TaskId) {
        self.lock().running.remove(task_id);
    }

    /// Remove a task that is still waiting for admission. Returns true if it was queued.
    pub fn dequeue(&self, task_id: &TaskId) -> bool {
        let mut state = self.lock();
        let before = state.queue.len();
        state.queue.retain(|(id, _)| id != task_id);
        state.queue.len() != before
    }

    /// Signal a running attempt to stop and wait until it has stopped cleanly.
    /// Returns false if `task_id` is not running.
    pub async fn interrupt(&self, task_id: &TaskId, intent: Interrupt) -> bool {
        let mut done = {
            let state = self.lock();
            let Some(running) = state.running.get(task_id) else {
                return false;
            };
            running.token.request(intent);
            running.done.clone()
        };
        // An error means the guard is gone, i.e. the attempt already finished.
        let _ = done.wait_for(|finished| *finished).await;
        true
    }

    /// Signal every running attempt at once, then wait for all of them to stop.
    /// Returns the ids that were interrupted.
    pub async fn interrupt_all(&self, intent: Interrupt) -> Vec<TaskId> {
        let waiting: Vec<(TaskId, watch::Receiver<bool>)> = {
            let state = self.lock();
            state
                .running
                .iter()
                .map(|(id, running)| {
                    running.token.request(intent);
                    (id.clone(), running.done.clone())
                })
                .collect()
        };
        let mut stopped = Vec::with_capacity(waiting.len());
        for (id, mut done) in waiting {
            let _ = done.wait_for(|finished| *finished).await;
            stopped.push(id);
        }
        stopped
    }

    pub fn is_running(&self, task_id: &TaskId) -> bool {
        self.lock().running.contains_key(task_id)
    }

    pub fn is_queued(&self, task_id: &TaskId) -> bool {
        self.lock().queue.iter().any(|(id, _)| id == task_id)
    }

    /// Remove every task waiting for admission. Returns their ids in FIFO order.
    pub fn drain_queue(&self) -> Vec<TaskId> {
        self.lock().queue.drain(..).map(|(id, _)| id).collect()
    }

    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn limit(&self) -> usize {
        self.lock().limit
    }
}
