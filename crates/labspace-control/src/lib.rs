//! Event routing, task execution and session control for labspace.
//!
//! The consumer process reads domain events from the broker, maps each
//! routing key to tasks and runs them on a bounded worker pool:
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────┐   ┌───────────────────┐
//! │ EventConsumer│──▶│ EventRouter │──▶│ TaskQueue │──▶│  WorkspaceTasks   │
//! └──────────────┘   └─────────────┘   └───────────┘   │  store + cluster  │
//!                                            ▲         └─────────┬─────────┘
//!                                            └── follow-up tasks ─┘
//! ```
//!
//! The front end never opens the store. It publishes
//! `workspace.launch.requested` and `workspace.allocation.deleted`, and the
//! consumer registers allocations, opens sessions and queues the cluster work.
//!
//! Teardown is an explicit chain. `terminate_session` expires the session
//! and yields `scale_down_workspace`; that scales the deployment to zero,
//! terminates the session and yields `delete_workspace_namespace`. Each step
//! is queued only after the previous one succeeded.
//!
//! # Usage
//!
//! Requesting a launch from another process:
//!
//! ```no_run
//! use labspace_broker::{AmqpPublisher, BrokerConfig, EventPublisher};
//! use labspace_control::LaunchRequest;
//! use labspace_core::{routing, AssignmentId, DomainEvent, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = AmqpPublisher::from_config(BrokerConfig::from_env());
//! let request = LaunchRequest::new(AssignmentId::generate(), UserId::generate());
//! publisher
//!     .publish(&DomainEvent::new(routing::LAUNCH_REQUESTED, request.to_fields()))
//!     .await?;
//! println!("allocation {}", request.allocation_id());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod handler;
pub mod queue;
pub mod request;
pub mod router;
pub mod routing;
pub mod session;
pub mod sweeps;
pub mod task;

pub use config::{ControlConfig, SessionConfig};
pub use error::{ControlError, Result};
pub use handler::{TaskHandler, WorkspaceTasks};
pub use queue::{RetryPolicy, TaskQueue, WorkerPool};
pub use request::LaunchRequest;
pub use router::EventRouter;
pub use routing::{tasks_for, EventTask, ROUTES};
pub use sweeps::spawn_sweeps;
pub use task::Task;
