//! Task queue and worker pool.
//!
//! Enqueueing never blocks. A dispatcher hands queued tasks to at most
//! `workers` concurrent executions. A task failing with a retriable error is
//! retried with linear backoff; its follow-up tasks are enqueued only once it
//! succeeds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{ControlError, Result};
use crate::handler::TaskHandler;
use crate::task::Task;

/// Retry behaviour for failing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff × n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff * retry
    }
}

/// Handle for enqueueing tasks.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    pending: Arc<watch::Sender<usize>>,
}

impl TaskQueue {
    /// Queue a task without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::QueueClosed` if the dispatcher has stopped.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(task).is_err() {
            self.finish();
            return Err(ControlError::QueueClosed);
        }
        Ok(())
    }

    /// Tasks queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until no task is queued or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn finish(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Runs queued tasks on a bounded set of workers.
pub struct WorkerPool;

impl WorkerPool {
    /// Start the dispatcher and return the queue feeding it.
    pub fn start<H: TaskHandler>(
        handler: Arc<H>,
        workers: usize,
        policy: RetryPolicy,
    ) -> (TaskQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        let queue = TaskQueue {
            tx,
            pending: Arc::new(pending),
        };
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let dispatcher = tokio::spawn(dispatch(rx, queue.clone(), handler, semaphore, policy));
        (queue, dispatcher)
    }
}

async fn dispatch<H: TaskHandler>(
    mut rx: mpsc::UnboundedReceiver<Task>,
    queue: TaskQueue,
    handler: Arc<H>,
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
) {
    while let Some(task) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let handler = Arc::clone(&handler);
        let queue = queue.clone();

        tokio::spawn(async move {
            if let Some(next) = execute(handler.as_ref(), &task, policy).await {
                for follow_up in next {
                    debug!(task = %task, next = %follow_up, "Queueing follow-up task");
                    if let Err(e) = queue.enqueue(follow_up) {
                        error!(task = %task, error = %e, "Failed to queue follow-up task");
                    }
                }
            }
            queue.finish();
            drop(permit);
        });
    }
}

/// Run a task with retries. Returns its follow-ups, or `None` if it failed.
async fn execute<H: TaskHandler + ?Sized>(
    handler: &H,
    task: &Task,
    policy: RetryPolicy,
) -> Option<Vec<Task>> {
    let mut retry = 0;
    loop {
        debug!(task = %task, retry, "Running task");
        match handler.handle(task).await {
            Ok(next) => return Some(next),
            Err(e) if e.is_retriable() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay(retry);
                warn!(task = %task, retry, ?delay, error = %e, "Task failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(task = %task, attempts = retry + 1, error = %e, "Task failed");
                return None;
            }
        }
    }
}
