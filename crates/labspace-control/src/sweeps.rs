//! Periodic session sweeps.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::ControlConfig;
use crate::queue::TaskQueue;
use crate::task::Task;

/// Spawn both sweeps. Each enqueues its task once per interval, starting one
/// interval after the call.
#[must_use]
pub fn spawn_sweeps(queue: &TaskQueue, config: &ControlConfig) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(sweep_every(
            queue.clone(),
            config.expired_sweep_interval,
            Task::CleanupExpiredSessions,
        )),
        tokio::spawn(sweep_every(
            queue.clone(),
            config.max_duration_sweep_interval,
            Task::CleanupMaxDurationSessions,
        )),
    ]
}

async fn sweep_every(queue: TaskQueue, period: Duration, task: Task) {
    info!(task = %task, period_secs = period.as_secs(), "Sweep scheduled");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = queue.enqueue(task.clone()) {
            error!(task = %task, error = %e, "Sweep stopped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TaskHandler;
    use crate::queue::{RetryPolicy, WorkerPool};
    use crate::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Count(Mutex<Vec<Task>>);

    #[async_trait]
    impl TaskHandler for Count {
        async fn handle(&self, task: &Task) -> Result<Vec<Task>> {
            self.0.lock().push(task.clone());
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_fire_on_their_intervals() {
        let handler = Arc::new(Count::default());
        let (queue, _) = WorkerPool::start(
            Arc::clone(&handler),
            1,
            RetryPolicy {
                max_retries: 0,
                backoff: Duration::ZERO,
            },
        );
        let sweeps = spawn_sweeps(&queue, &ControlConfig::default());

        tokio::time::sleep(Duration::from_secs(60 * 60 + 1)).await;
        queue.wait_idle().await;

        let tasks = handler.0.lock().clone();
        let expired = tasks.iter().filter(|t| **t == Task::CleanupExpiredSessions).count();
        let max = tasks.iter().filter(|t| **t == Task::CleanupMaxDurationSessions).count();
        assert_eq!(expired, 1);
        assert_eq!(max, 3);

        for sweep in sweeps {
            sweep.abort();
        }
    }
}
