//! Deterministic cluster object naming.
//!
//! Every object that makes up one workspace is named from the allocation ID, so
//! re-applying the object set finds the existing objects instead of creating
//! new ones, and two allocations never collide.

use crate::events::WorkspaceMeta;
use crate::ids::AllocationId;
use std::collections::BTreeMap;

/// Default namespace prefix for workspace namespaces.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "wa-";

/// Pod label carrying the namespace name (also the service selector).
pub const APP_LABEL: &str = "app";
/// Pod label carrying the learner reference.
pub const STUDENT_LABEL: &str = "student";
/// Pod label carrying the assignment reference.
pub const ASSIGNMENT_LABEL: &str = "assignment";
/// Pod label carrying the allocation reference.
pub const ALLOCATION_LABEL: &str = "workspace_allocation";
/// Pod label marking workspace pods for the supervisor's selector.
pub const POD_KIND_LABEL: &str = "pod";
/// Value of [`POD_KIND_LABEL`] on workspace pods.
pub const POD_KIND_WORKSPACE: &str = "workspace";

/// Names of all cluster objects belonging to one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceNames {
    /// Namespace holding every other object.
    pub namespace: String,
    /// Credentials secret.
    pub secret: String,
    /// Workspace deployment.
    pub deployment: String,
    /// Service in front of the deployment.
    pub service: String,
    /// Main workspace container.
    pub container: String,
    /// Path-prefix stripping middleware.
    pub strip_prefix_middleware: String,
    /// Forward-auth middleware.
    pub forward_auth_middleware: String,
    /// Ingress routing rule.
    pub ingress_route: String,
}

impl WorkspaceNames {
    /// Derive the names for an allocation.
    #[must_use]
    pub fn new(prefix: &str, allocation: &AllocationId) -> Self {
        let namespace = namespace_for(prefix, allocation);
        Self {
            secret: namespace.clone(),
            deployment: namespace.clone(),
            service: namespace.clone(),
            container: namespace.clone(),
            strip_prefix_middleware: format!("strip-prefix-{namespace}"),
            forward_auth_middleware: format!("forward-auth-{namespace}"),
            ingress_route: namespace.clone(),
            namespace,
        }
    }
}

/// Namespace name for an allocation.
#[must_use]
pub fn namespace_for(prefix: &str, allocation: &AllocationId) -> String {
    format!("{prefix}{}", allocation.to_hex())
}

/// Whether a namespace belongs to a workspace.
#[must_use]
pub fn is_workspace_namespace(prefix: &str, namespace: &str) -> bool {
    namespace.starts_with(prefix)
}

/// Labels placed on the deployment and its pods.
#[must_use]
pub fn workspace_labels(namespace: &str, meta: &WorkspaceMeta) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(APP_LABEL.to_string(), namespace.to_string());
    labels.insert(STUDENT_LABEL.to_string(), meta.student_id.clone());
    labels.insert(ASSIGNMENT_LABEL.to_string(), meta.assignment_id.clone());
    labels.insert(
        ALLOCATION_LABEL.to_string(),
        meta.workspace_allocation_id.clone(),
    );
    labels
}

/// Read workspace metadata back from pod labels.
///
/// Returns `None` if the pod is missing any of the identifying labels.
#[must_use]
pub fn meta_from_labels(labels: &BTreeMap<String, String>) -> Option<WorkspaceMeta> {
    Some(WorkspaceMeta {
        assignment_id: labels.get(ASSIGNMENT_LABEL)?.clone(),
        student_id: labels.get(STUDENT_LABEL)?.clone(),
        workspace_allocation_id: labels.get(ALLOCATION_LABEL)?.clone(),
    })
}
