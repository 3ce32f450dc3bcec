//! Tasks executed by the worker pool.

use std::fmt;

use labspace_core::{AllocationId, EventFields, SessionId};

/// One unit of work.
///
/// Session tasks carry the triggering event's fields; the handler resolves
/// the allocation from them when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Register the allocation, open a session if none is active and queue the launch.
    RequestLaunch(EventFields),
    /// Remove an allocation and its sessions, then its namespace.
    DeleteAllocation(EventFields),
    /// Apply the workspace's cluster objects and refresh its status.
    LaunchWorkspace {
        /// Allocation to launch.
        allocation_id: AllocationId,
    },
    /// Mark the active session started.
    StartSession(EventFields),
    /// Extend the active session.
    ExtendSession(EventFields),
    /// Expire the active session and begin teardown.
    TerminateSession(EventFields),
    /// Record a failed workspace launch.
    LogLaunchFailure(EventFields),
    /// Scale the session's deployment to zero, then end the session.
    ScaleDownWorkspace {
        /// Session being torn down.
        session_id: SessionId,
    },
    /// Delete the namespace and wait until it is gone.
    DeleteWorkspaceNamespace {
        /// Allocation whose namespace is deleted.
        allocation_id: AllocationId,
    },
    /// Delete the namespace of a removed allocation, if it still exists.
    TerminateNamespaceIfExists {
        /// Removed allocation.
        allocation_id: AllocationId,
    },
    /// Tear down running workspaces whose sessions expired.
    CleanupExpiredSessions,
    /// Expire and tear down sessions past the maximum duration.
    CleanupMaxDurationSessions,
}

impl Task {
    /// Stable task name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestLaunch(_) => "request_launch",
            Self::DeleteAllocation(_) => "delete_allocation",
            Self::LaunchWorkspace { .. } => "launch_workspace",
            Self::StartSession(_) => "start_session",
            Self::ExtendSession(_) => "extend_session",
            Self::TerminateSession(_) => "terminate_session",
            Self::LogLaunchFailure(_) => "log_workspace_launch_failure",
            Self::ScaleDownWorkspace { .. } => "scale_down_workspace",
            Self::DeleteWorkspaceNamespace { .. } => "delete_workspace_namespace",
            Self::TerminateNamespaceIfExists { .. } => "terminate_workspace_namespace_if_exists",
            Self::CleanupExpiredSessions => "cleanup_expired_sessions",
            Self::CleanupMaxDurationSessions => "cleanup_sessions_older_than_max_duration",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LaunchWorkspace { allocation_id }
            | Self::DeleteWorkspaceNamespace { allocation_id }
            | Self::TerminateNamespaceIfExists { allocation_id } => {
                write!(f, "{}({allocation_id})", self.name())
            }
            Self::ScaleDownWorkspace { session_id } => write!(f, "{}({session_id})", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}
