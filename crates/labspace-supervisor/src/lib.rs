//! Idle-health supervisor for labspace workspaces.
//!
//! One activity check lists the workspace pods that have been ready for the
//! readiness grace period, polls each one's `/healthz/` endpoint with bounded
//! concurrency and publishes:
//!
//! - `workspace.status.alive` when the workspace reports itself alive
//! - `workspace.status.idle` when it has been inactive for at least the idle threshold
//!
//! Workspaces inactive for less than the threshold produce no event. A failed
//! poll or publish is logged and only affects its own workspace.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod health;
pub mod inventory;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{Result, SupervisorError};
pub use health::{evaluate, healthz_url, ready_long_enough, Activity, HealthReport};
pub use inventory::{KubeInventory, WorkspaceInventory, WorkspaceTarget};
pub use supervisor::{ActivitySupervisor, CheckSummary};

#[cfg(any(test, feature = "test-utils"))]
pub use inventory::mock::StaticInventory;
