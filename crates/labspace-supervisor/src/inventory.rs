//! Discovery of workspaces eligible for polling.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, warn};

use labspace_core::naming::meta_from_labels;
use labspace_core::WorkspaceMeta;

use crate::health::{healthz_url, ready_long_enough};
use crate::Result;

/// One workspace to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceTarget {
    /// Workspace namespace.
    pub namespace: String,
    /// Identifying fields copied from the pod labels.
    pub meta: WorkspaceMeta,
    /// Liveness endpoint.
    pub healthz_url: String,
}

/// Lists workspaces whose pods have been ready for the grace period.
#[async_trait]
pub trait WorkspaceInventory: Send + Sync {
    /// Workspaces ready for at least `grace` at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pods cannot be listed.
    async fn ready_workspaces(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Vec<WorkspaceTarget>>;
}

/// Inventory backed by the cluster API.
#[derive(Clone)]
pub struct KubeInventory {
    client: Client,
    pod_selector: String,
}

impl KubeInventory {
    /// Create an inventory listing pods that match `pod_selector` in all namespaces.
    #[must_use]
    pub fn new(client: Client, pod_selector: impl Into<String>) -> Self {
        Self {
            client,
            pod_selector: pod_selector.into(),
        }
    }

    /// Check that the cluster API is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if namespaces cannot be listed.
    pub async fn ping(&self) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.list(&ListParams::default().limit(1)).await?;
        Ok(())
    }

    async fn target_for(&self, pod: &Pod) -> Option<WorkspaceTarget> {
        let namespace = pod.metadata.namespace.clone()?;
        let Some(meta) = pod.metadata.labels.as_ref().and_then(meta_from_labels) else {
            warn!(namespace, "Workspace pod lacks identifying labels");
            return None;
        };

        // The service shares the namespace's name.
        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let service = match services.get_opt(&namespace).await {
            Ok(Some(service)) => service,
            Ok(None) => {
                warn!(namespace, "Workspace service not found");
                return None;
            }
            Err(e) => {
                warn!(namespace, error = %e, "Failed to read workspace service");
                return None;
            }
        };

        Some(WorkspaceTarget {
            healthz_url: healthz_url(&service)?,
            namespace,
            meta,
        })
    }
}

#[async_trait]
impl WorkspaceInventory for KubeInventory {
    async fn ready_workspaces(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Vec<WorkspaceTarget>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default().labels(&self.pod_selector))
            .await?;

        let mut targets = Vec::new();
        for pod in list.items.iter().filter(|p| ready_long_enough(p, now, grace)) {
            if let Some(target) = self.target_for(pod).await {
                targets.push(target);
            }
        }

        debug!(
            listed = list.items.len(),
            eligible = targets.len(),
            "Collected workspaces to poll"
        );
        Ok(targets)
    }
}

/// Fixed inventory for testing without a cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Returns whatever targets were configured.
    #[derive(Default)]
    pub struct StaticInventory {
        targets: Mutex<Vec<WorkspaceTarget>>,
    }

    impl StaticInventory {
        /// Create an inventory with fixed targets.
        #[must_use]
        pub fn new(targets: Vec<WorkspaceTarget>) -> Self {
            Self {
                targets: Mutex::new(targets),
            }
        }
    }

    #[async_trait]
    impl WorkspaceInventory for StaticInventory {
        async fn ready_workspaces(
            &self,
            _now: DateTime<Utc>,
            _grace: Duration,
        ) -> Result<Vec<WorkspaceTarget>> {
            Ok(self.targets.lock().clone())
        }
    }
}
