//! Allocation records stored in the database.

use chrono::{DateTime, Utc};
use labspace_core::{AllocationId, AssignmentId, UserId, WorkspaceMeta};
use serde::{Deserialize, Serialize};

/// One learner's workspace for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceAllocation {
    /// Identifier, derived from the (assignment, learner) pair.
    pub allocation_id: AllocationId,
    /// Assignment reference.
    pub assignment_id: AssignmentId,
    /// Learner reference.
    pub learner_id: UserId,
    /// Workspace image and resources.
    pub spec: WorkspaceSpec,
    /// Last observed cluster status; `None` when unknown or after a session ends.
    pub cluster_status: Option<ClusterStatus>,
    /// When `cluster_status` was last written.
    pub status_updated_at: Option<DateTime<Utc>>,
    /// Persistent volume attached to the workspace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeDescriptor>,
    /// Opaque slug used in the workspace URL.
    pub url_slug: uuid::Uuid,
    /// Run the init container in debug mode.
    pub debug: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl WorkspaceAllocation {
    /// Create a new allocation record.
    #[must_use]
    pub fn new(
        assignment_id: AssignmentId,
        learner_id: UserId,
        spec: WorkspaceSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            allocation_id: AllocationId::derive(&assignment_id, &learner_id),
            assignment_id,
            learner_id,
            spec,
            cluster_status: None,
            status_updated_at: None,
            volume: None,
            url_slug: uuid::Uuid::new_v4(),
            debug: false,
            created_at: now,
        }
    }

    /// Identifying fields carried in labels and events.
    #[must_use]
    pub fn meta(&self) -> WorkspaceMeta {
        WorkspaceMeta::new(&self.allocation_id, &self.assignment_id, &self.learner_id)
    }

    /// Public URL of the workspace.
    #[must_use]
    pub fn workspace_url(&self, protocol: &str, host: &str) -> String {
        format!("{protocol}://{host}/workspace/{}/", self.url_slug)
    }

    /// Record a cluster status observation.
    pub fn set_cluster_status(&mut self, status: Option<ClusterStatus>, now: DateTime<Utc>) {
        self.cluster_status = status;
        self.status_updated_at = Some(now);
    }
}

/// Image and resources requested for a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    /// Container image.
    pub image: String,
    /// Baseline CPU count.
    pub cpus: f64,
    /// Baseline memory in GiB.
    pub memory_gib: f64,
    /// Number of GPUs; zero schedules onto the CPU pool.
    pub gpus: u32,
    /// Persistent storage size in GiB.
    pub storage_gib: u32,
    /// Repository cloned into the workspace on first start.
    pub code_repo: Option<String>,
}

impl Default for WorkspaceSpec {
    fn default() -> Self {
        Self {
            image: "codercom/code-server:latest".to_string(),
            cpus: 1.0,
            memory_gib: 2.0,
            gpus: 0,
            storage_gib: 10,
            code_repo: None,
        }
    }
}

/// Cloud volume attached to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Provider volume ID.
    pub volume_id: String,
    /// Availability zone the volume lives in.
    pub availability_zone: String,
}

/// Cluster status of a workspace pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ClusterStatus {
    /// Pod accepted but not running yet.
    Pending = 1,
    /// Pod running with its workspace container ready.
    Running = 2,
    /// Pod failed, or readiness never arrived.
    Failed = 3,
    /// Phase could not be determined.
    Unknown = 4,
}

impl ClusterStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Map a Kubernetes pod phase.
    #[must_use]
    pub fn from_k8s_phase(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_id_follows_pair() {
        let assignment = AssignmentId::generate();
        let learner = UserId::generate();
        let a = WorkspaceAllocation::new(assignment, learner, WorkspaceSpec::default(), Utc::now());
        let b = WorkspaceAllocation::new(assignment, learner, WorkspaceSpec::default(), Utc::now());

        assert_eq!(a.allocation_id, b.allocation_id);
        assert_ne!(a.url_slug, b.url_slug);
    }

    #[test]
    fn workspace_url_uses_slug() {
        let alloc = WorkspaceAllocation::new(
            AssignmentId::generate(),
            UserId::generate(),
            WorkspaceSpec::default(),
            Utc::now(),
        );
        let url = alloc.workspace_url("https", "labs.example.edu");
        assert_eq!(
            url,
            format!("https://labs.example.edu/workspace/{}/", alloc.url_slug)
        );
    }

    #[test]
    fn phase_mapping() {
        assert_eq!(ClusterStatus::from_k8s_phase("Running"), ClusterStatus::Running);
        assert_eq!(ClusterStatus::from_k8s_phase("Pending"), ClusterStatus::Pending);
        assert_eq!(ClusterStatus::from_k8s_phase("Succeeded"), ClusterStatus::Unknown);
    }
}
