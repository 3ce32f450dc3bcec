//! Cluster watcher for labspace workspaces.
//!
//! Streams cluster `Event` objects for pods outside the system namespaces,
//! keeps those in workspace namespaces, and publishes a domain event for each
//! lifecycle transition of the workspace container:
//!
//! | Event reason | Routing key |
//! |---|---|
//! | `Scheduled` | `k8s.workspace.scheduled` |
//! | `Created` | `k8s.workspace.created` |
//! | `Started` | `k8s.workspace.started` |
//! | `Failed`, `BackOff` | `k8s.workspace.failed` |
//! | `Killing` | `k8s.workspace.deleted` |
//!
//! The subscription is driven by a small state machine ([`WatchState`]): an
//! expired watch cursor resubscribes, anything else unexpected stops the
//! watcher so the process exits and is restarted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod classify;
pub mod config;
pub mod error;
pub mod source;
pub mod state;
pub mod watcher;

pub use config::WatcherConfig;
pub use error::{is_gone, Result, WatcherError};
pub use source::{EventSource, KubeEventSource, KubePodLookup, PodLookup};
pub use state::{WatchSignal, WatchState};
pub use watcher::{ClusterWatcher, EventOutcome, SkipReason};

#[cfg(any(test, feature = "test-utils"))]
pub use source::mock::{MockPodLookup, ScriptedEventSource};
