//! Routing keys to tasks.
//!
//! | Routing key                    | Task               |
//! |--------------------------------|--------------------|
//! | `k8s.workspace.scheduled`      | none               |
//! | `k8s.workspace.created`        | none               |
//! | `k8s.workspace.started`        | start session      |
//! | `k8s.workspace.failed`         | log launch failure |
//! | `k8s.workspace.deleted`        | none               |
//! | `workspace.status.alive`       | extend session     |
//! | `workspace.status.idle`        | terminate session  |
//! | `workspace.launch.requested`   | request launch     |
//! | `workspace.allocation.deleted` | delete allocation  |

use labspace_core::{routing, EventFields};

use crate::task::Task;

/// Task triggered by a routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTask {
    /// [`Task::StartSession`].
    StartSession,
    /// [`Task::ExtendSession`].
    ExtendSession,
    /// [`Task::TerminateSession`].
    TerminateSession,
    /// [`Task::LogLaunchFailure`].
    LogLaunchFailure,
    /// [`Task::RequestLaunch`].
    RequestLaunch,
    /// [`Task::DeleteAllocation`].
    DeleteAllocation,
}

impl EventTask {
    /// Build the task with the event's fields as arguments.
    #[must_use]
    pub fn with_fields(self, fields: EventFields) -> Task {
        match self {
            Self::StartSession => Task::StartSession(fields),
            Self::ExtendSession => Task::ExtendSession(fields),
            Self::TerminateSession => Task::TerminateSession(fields),
            Self::LogLaunchFailure => Task::LogLaunchFailure(fields),
            Self::RequestLaunch => Task::RequestLaunch(fields),
            Self::DeleteAllocation => Task::DeleteAllocation(fields),
        }
    }
}

/// Routing key and the tasks it triggers.
pub const ROUTES: &[(&str, &[EventTask])] = &[
    (routing::WORKSPACE_SCHEDULED, &[]),
    (routing::WORKSPACE_CREATED, &[]),
    (routing::WORKSPACE_STARTED, &[EventTask::StartSession]),
    (routing::WORKSPACE_FAILED, &[EventTask::LogLaunchFailure]),
    (routing::WORKSPACE_DELETED, &[]),
    (routing::STATUS_ALIVE, &[EventTask::ExtendSession]),
    (routing::STATUS_IDLE, &[EventTask::TerminateSession]),
    (routing::LAUNCH_REQUESTED, &[EventTask::RequestLaunch]),
    (routing::ALLOCATION_DELETED, &[EventTask::DeleteAllocation]),
];

/// Tasks for a routing key, or `None` if the key is not mapped.
#[must_use]
pub fn tasks_for(routing_key: &str) -> Option<&'static [EventTask]> {
    ROUTES
        .iter()
        .find(|(key, _)| *key == routing_key)
        .map(|(_, tasks)| *tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_keys_map_to_tasks() {
        assert_eq!(
            tasks_for(routing::WORKSPACE_STARTED),
            Some(&[EventTask::StartSession][..])
        );
        assert_eq!(
            tasks_for(routing::STATUS_ALIVE),
            Some(&[EventTask::ExtendSession][..])
        );
        assert_eq!(
            tasks_for(routing::STATUS_IDLE),
            Some(&[EventTask::TerminateSession][..])
        );
        assert_eq!(
            tasks_for(routing::WORKSPACE_FAILED),
            Some(&[EventTask::LogLaunchFailure][..])
        );
    }

    #[test]
    fn front_end_keys_map_to_tasks() {
        assert_eq!(
            tasks_for(routing::LAUNCH_REQUESTED),
            Some(&[EventTask::RequestLaunch][..])
        );
        assert_eq!(
            tasks_for(routing::ALLOCATION_DELETED),
            Some(&[EventTask::DeleteAllocation][..])
        );
    }

    #[test]
    fn observed_keys_have_no_tasks() {
        for key in [
            routing::WORKSPACE_SCHEDULED,
            routing::WORKSPACE_CREATED,
            routing::WORKSPACE_DELETED,
        ] {
            assert_eq!(tasks_for(key), Some(&[][..]), "{key}");
        }
    }

    #[test]
    fn unmapped_keys() {
        assert_eq!(tasks_for("workspace.status.unknown"), None);
        assert_eq!(tasks_for(routing::TEST_CONNECTION), None);
    }

    #[test]
    fn every_route_reaches_the_queue() {
        for (key, _) in ROUTES {
            assert!(labspace_broker::is_routed_to_queue(key), "{key}");
        }
    }
}
