//! Broker messages to queued tasks.

use tracing::{debug, error, info};

use labspace_broker::MessageHandler;
use labspace_core::EventFields;

use crate::queue::TaskQueue;
use crate::routing::tasks_for;

/// Routes consumed events onto the task queue.
///
/// Never waits for a task to run. Unmapped keys and malformed bodies are
/// logged as errors and dropped; the consumer keeps running.
pub struct EventRouter {
    queue: TaskQueue,
}

impl EventRouter {
    /// Create a router feeding `queue`.
    #[must_use]
    pub const fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }

    /// Enqueue the tasks mapped to `routing_key`. Returns how many were queued.
    pub fn route(&self, routing_key: &str, fields: &EventFields) -> usize {
        let Some(tasks) = tasks_for(routing_key) else {
            error!(routing_key, ?fields, "No task mapped to routing key");
            return 0;
        };
        if tasks.is_empty() {
            info!(routing_key, ?fields, "Observed event");
            return 0;
        }

        let mut queued = 0;
        for kind in tasks {
            let task = kind.with_fields(fields.clone());
            debug!(routing_key, task = %task, "Dispatching task");
            match self.queue.enqueue(task) {
                Ok(()) => queued += 1,
                Err(e) => error!(routing_key, error = %e, "Failed to queue task"),
            }
        }
        queued
    }
}

impl MessageHandler for EventRouter {
    fn handle(&self, routing_key: &str, body: &[u8]) {
        match serde_json::from_slice::<EventFields>(body) {
            Ok(fields) => {
                self.route(routing_key, &fields);
            }
            Err(e) => error!(routing_key, error = %e, "Malformed event body"),
        }
    }
}
