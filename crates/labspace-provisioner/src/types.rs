//! Types for the provisioner crate.

use std::time::Duration;

use labspace_core::naming::DEFAULT_NAMESPACE_PREFIX;
use serde::{Deserialize, Serialize};

/// Kind of cluster object in a workspace's resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Namespace holding the workspace.
    Namespace,
    /// Credentials secret.
    Secret,
    /// Service in front of the workspace pod.
    Service,
    /// Workspace deployment.
    Deployment,
    /// Path-prefix stripping middleware.
    StripPrefixMiddleware,
    /// Forward-auth middleware.
    ForwardAuthMiddleware,
    /// Ingress routing rule.
    IngressRoute,
}

/// Result of creating one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The object was created.
    Created,
    /// The object was already present and left untouched.
    AlreadyExisted,
}

/// One object of an applied resource set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Object kind.
    pub kind: ResourceKind,
    /// Object name.
    pub name: String,
    /// What the apply did.
    pub outcome: ApplyOutcome,
}

/// The objects created (or found) by one `apply`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Workspace namespace.
    pub namespace: String,
    /// Objects in apply order.
    pub resources: Vec<AppliedResource>,
}

impl ResourceSet {
    /// Number of objects that were newly created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.outcome == ApplyOutcome::Created)
            .count()
    }
}

/// Result of a scale request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// Replica count was patched.
    Scaled,
    /// The deployment no longer exists.
    NotFound,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The namespace was deleted (or deletion started).
    Deleted,
    /// The namespace did not exist.
    NotFound,
}

/// Configuration for the resource provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Prefix of workspace namespace names.
    pub namespace_prefix: String,
    /// Image of the init container that prepares the home volume.
    pub init_container_image: String,
    /// Multiplier applied to the baseline CPU count for requests.
    pub cpu_request_multiplier: f64,
    /// Multiplier applied to the baseline CPU count for limits.
    pub cpu_burst_multiplier: f64,
    /// Multiplier applied to the baseline memory for requests.
    pub memory_request_multiplier: f64,
    /// Multiplier applied to the baseline memory for limits.
    pub memory_burst_multiplier: f64,
    /// Pin workspaces to node groups.
    pub enable_node_selectors: bool,
    /// Node label identifying a node group.
    pub node_group_label: String,
    /// Node group for CPU-only workspaces.
    pub cpu_node_group: String,
    /// Node group for GPU workspaces.
    pub gpu_node_group: String,
    /// Initial workspace password stored in the secret.
    pub default_password: String,
    /// Base URL of the web service that authorizes workspace requests.
    pub auth_base_url: String,
    /// Ingress entry point for the routing rule.
    pub ingress_entrypoint: String,
    /// Folder opened by the workspace editor.
    pub user_assignment_folder: String,
    /// Token used by the init container to clone private repositories.
    pub github_access_token: String,
    /// Poll interval while waiting for a namespace to disappear.
    pub namespace_delete_poll: Duration,
    /// Readiness polling attempts before giving up.
    pub readiness_retries: u32,
    /// Linear backoff step between readiness polls.
    pub readiness_backoff: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            init_container_image: "labspace/init-workspace:latest".to_string(),
            cpu_request_multiplier: 0.75,
            cpu_burst_multiplier: 2.0,
            memory_request_multiplier: 0.9,
            memory_burst_multiplier: 1.2,
            enable_node_selectors: false,
            node_group_label: "eks.amazonaws.com/nodegroup".to_string(),
            cpu_node_group: "workspaces-cpu".to_string(),
            gpu_node_group: "workspaces-gpu".to_string(),
            default_password: String::new(),
            auth_base_url: "http://web.vcl-core.svc:8000".to_string(),
            ingress_entrypoint: "web".to_string(),
            user_assignment_folder: "/home/coder/assignment".to_string(),
            github_access_token: String::new(),
            namespace_delete_poll: Duration::from_millis(1000),
            readiness_retries: 7,
            readiness_backoff: Duration::from_millis(300),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `WORKSPACES_NAMESPACE_PREFIX`
    /// - `INIT_CONTAINER_IMAGE`
    /// - `CPU_REQUEST_MULTIPLIER`, `CPU_BURST_MULTIPLIER`
    /// - `MEMORY_REQUEST_MULTIPLIER`, `MEMORY_BURST_MULTIPLIER`
    /// - `ENABLE_NODE_SELECTORS`, `NODE_GROUP_LABEL`, `CPU_NODE_GROUP_NAME`, `GPU_NODE_GROUP_NAME`
    /// - `WORKSPACE_DEFAULT_PASSWORD`, `WORKSPACE_AUTH_BASE_URL`
    /// - `INGRESS_ENTRYPOINT`, `USER_ASSIGNMENT_FOLDER`, `GITHUB_ACCESS_TOKEN`
    /// - `NAMESPACE_DELETE_POLL_MS`, `READINESS_RETRIES`, `READINESS_BACKOFF_MS`
    ///
    /// Values that fail to parse are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WORKSPACES_NAMESPACE_PREFIX") {
            config.namespace_prefix = val;
        }
        if let Ok(val) = std::env::var("INIT_CONTAINER_IMAGE") {
            config.init_container_image = val;
        }
        for (key, slot) in [
            ("CPU_REQUEST_MULTIPLIER", &mut config.cpu_request_multiplier),
            ("CPU_BURST_MULTIPLIER", &mut config.cpu_burst_multiplier),
            ("MEMORY_REQUEST_MULTIPLIER", &mut config.memory_request_multiplier),
            ("MEMORY_BURST_MULTIPLIER", &mut config.memory_burst_multiplier),
        ] {
            if let Ok(val) = std::env::var(key) {
                if let Ok(n) = val.parse() {
                    *slot = n;
                }
            }
        }
        if let Ok(val) = std::env::var("ENABLE_NODE_SELECTORS") {
            config.enable_node_selectors = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("NODE_GROUP_LABEL") {
            config.node_group_label = val;
        }
        if let Ok(val) = std::env::var("CPU_NODE_GROUP_NAME") {
            config.cpu_node_group = val;
        }
        if let Ok(val) = std::env::var("GPU_NODE_GROUP_NAME") {
            config.gpu_node_group = val;
        }
        if let Ok(val) = std::env::var("WORKSPACE_DEFAULT_PASSWORD") {
            config.default_password = val;
        }
        if let Ok(val) = std::env::var("WORKSPACE_AUTH_BASE_URL") {
            config.auth_base_url = val;
        }
        if let Ok(val) = std::env::var("INGRESS_ENTRYPOINT") {
            config.ingress_entrypoint = val;
        }
        if let Ok(val) = std::env::var("USER_ASSIGNMENT_FOLDER") {
            config.user_assignment_folder = val;
        }
        if let Ok(val) = std::env::var("GITHUB_ACCESS_TOKEN") {
            config.github_access_token = val;
        }
        if let Ok(val) = std::env::var("NAMESPACE_DELETE_POLL_MS") {
            if let Ok(n) = val.parse() {
                config.namespace_delete_poll = Duration::from_millis(n);
            }
        }
        if let Ok(val) = std::env::var("READINESS_RETRIES") {
            if let Ok(n) = val.parse() {
                config.readiness_retries = n;
            }
        }
        if let Ok(val) = std::env::var("READINESS_BACKOFF_MS") {
            if let Ok(n) = val.parse() {
                config.readiness_backoff = Duration::from_millis(n);
            }
        }

        config
    }

    /// Check that the multipliers keep requests below and limits above the baseline.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first multiplier out of range.
    pub fn validate(&self) -> crate::Result<()> {
        let check = |name: &str, value: f64, below_one: bool| {
            let ok = if below_one {
                value > 0.0 && value <= 1.0
            } else {
                value >= 1.0
            };
            if ok {
                Ok(())
            } else {
                Err(crate::ProvisionerError::Config(format!(
                    "{name} out of range: {value}"
                )))
            }
        };
        check("cpu_request_multiplier", self.cpu_request_multiplier, true)?;
        check("memory_request_multiplier", self.memory_request_multiplier, true)?;
        check("cpu_burst_multiplier", self.cpu_burst_multiplier, false)?;
        check("memory_burst_multiplier", self.memory_burst_multiplier, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.namespace_prefix, "wa-");
        assert_eq!(config.readiness_retries, 7);
        assert_eq!(config.namespace_delete_poll, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_inverted_multipliers() {
        let config = ProvisionerConfig {
            cpu_request_multiplier: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProvisionerConfig {
            memory_burst_multiplier: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn resource_set_counts_created() {
        let set = ResourceSet {
            namespace: "wa-x".to_string(),
            resources: vec![
                AppliedResource {
                    kind: ResourceKind::Namespace,
                    name: "wa-x".to_string(),
                    outcome: ApplyOutcome::AlreadyExisted,
                },
                AppliedResource {
                    kind: ResourceKind::Secret,
                    name: "wa-x".to_string(),
                    outcome: ApplyOutcome::Created,
                },
            ],
        };
        assert_eq!(set.created_count(), 1);
    }
}
