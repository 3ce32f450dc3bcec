//! Kubernetes provisioner implementation.
//!
//! [`K8sProvisioner`] applies the resource set of a workspace one object at a
//! time, treating "already exists" as success, and tears it down by deleting
//! the namespace.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret, Service};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use labspace_core::{AllocationId, WorkspaceNames};
use labspace_store::{ClusterStatus, WorkspaceAllocation};

use crate::error::{is_already_exists, is_not_found};
use crate::resources::{Manifest, ManifestContext, WorkspaceResource};
use crate::types::{
    AppliedResource, ApplyOutcome, DeleteOutcome, ProvisionerConfig, ResourceSet, ScaleOutcome,
};
use crate::Result;

/// The `Provisioner` trait creates, scales and removes workspace resource sets.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create every object of the allocation's resource set.
    ///
    /// Objects that already exist are left untouched and reported as such.
    ///
    /// # Errors
    ///
    /// Returns an error for any API failure other than "already exists".
    async fn apply(&self, allocation: &WorkspaceAllocation) -> Result<ResourceSet>;

    /// Patch the replica count of the workspace deployment.
    ///
    /// # Errors
    ///
    /// Returns an error for any API failure other than "not found".
    async fn scale(&self, allocation_id: &AllocationId, replicas: i32) -> Result<ScaleOutcome>;

    /// Delete the workspace namespace, optionally waiting until it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error for any API failure other than "not found".
    async fn delete(&self, allocation_id: &AllocationId, wait: bool) -> Result<DeleteOutcome>;

    /// Current cluster status of the workspace pod.
    ///
    /// `None` while no pod exists or its workspace container is not ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the pods cannot be listed.
    async fn workspace_status(&self, allocation_id: &AllocationId)
        -> Result<Option<ClusterStatus>>;

    /// Check that the cluster API is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if namespaces cannot be listed.
    async fn ping(&self) -> Result<()>;
}

/// Map a create result, treating "already exists" as success.
///
/// # Errors
///
/// Passes through every other API failure.
pub fn tolerate_already_exists<T>(result: kube::Result<T>) -> Result<ApplyOutcome> {
    match result {
        Ok(_) => Ok(ApplyOutcome::Created),
        Err(e) if is_already_exists(&e) => Ok(ApplyOutcome::AlreadyExisted),
        Err(e) => Err(e.into()),
    }
}

/// Cluster status from a pod: its phase, once the first container is ready.
#[must_use]
pub fn status_from_pod(pod: &Pod) -> Option<ClusterStatus> {
    let status = pod.status.as_ref()?;
    let ready = status
        .container_statuses
        .as_ref()
        .and_then(|cs| cs.first())
        .is_some_and(|c| c.ready);
    if !ready {
        return None;
    }
    status.phase.as_deref().map(ClusterStatus::from_k8s_phase)
}

/// Kubernetes-based provisioner for workspace resource sets.
pub struct K8sProvisioner {
    client: Client,
    config: ProvisionerConfig,
}

impl K8sProvisioner {
    /// Create a new provisioner.
    ///
    /// Uses in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client cannot be created.
    pub async fn new(config: ProvisionerConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::try_default().await?;
        Ok(Self { client, config })
    }

    /// Create a provisioner with a pre-configured client.
    #[must_use]
    pub fn with_client(client: Client, config: ProvisionerConfig) -> Self {
        Self { client, config }
    }

    /// Get a reference to the provisioner config.
    #[must_use]
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    fn names(&self, allocation_id: &AllocationId) -> WorkspaceNames {
        WorkspaceNames::new(&self.config.namespace_prefix, allocation_id)
    }

    async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<ApplyOutcome> {
        let params = PostParams::default();
        match manifest {
            Manifest::Namespace(obj) => {
                let api: Api<Namespace> = Api::all(self.client.clone());
                tolerate_already_exists(api.create(&params, obj).await)
            }
            Manifest::Secret(obj) => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                tolerate_already_exists(api.create(&params, obj).await)
            }
            Manifest::Service(obj) => {
                let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
                tolerate_already_exists(api.create(&params, obj).await)
            }
            Manifest::Deployment(obj) => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                tolerate_already_exists(api.create(&params, obj.as_ref()).await)
            }
            Manifest::Custom { resource, object } => {
                let api: Api<DynamicObject> =
                    Api::namespaced_with(self.client.clone(), namespace, resource);
                tolerate_already_exists(api.create(&params, object).await)
            }
        }
    }
}

#[async_trait]
impl Provisioner for K8sProvisioner {
    async fn apply(&self, allocation: &WorkspaceAllocation) -> Result<ResourceSet> {
        let ctx = ManifestContext::new(allocation, &self.config);
        let namespace = ctx.names.namespace.clone();
        let mut set = ResourceSet {
            namespace: namespace.clone(),
            resources: Vec::with_capacity(WorkspaceResource::ALL.len()),
        };

        for resource in WorkspaceResource::ALL {
            let name = resource.name(&ctx.names).to_string();
            let outcome = self.create(&namespace, &resource.manifest(&ctx)).await?;

            match outcome {
                ApplyOutcome::Created => {
                    debug!(namespace, name, kind = ?resource.kind(), "Created object");
                }
                ApplyOutcome::AlreadyExisted => {
                    info!(namespace, name, kind = ?resource.kind(), "Object already exists, skipping");
                }
            }

            set.resources.push(AppliedResource {
                kind: resource.kind(),
                name,
                outcome,
            });
        }

        info!(
            allocation_id = %allocation.allocation_id,
            namespace,
            created = set.created_count(),
            "Applied workspace resources"
        );

        Ok(set)
    }

    async fn scale(&self, allocation_id: &AllocationId, replicas: i32) -> Result<ScaleOutcome> {
        let names = self.names(allocation_id);
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &names.namespace);
        let patch = Patch::Merge(json!({ "spec": { "replicas": replicas } }));

        match api
            .patch_scale(&names.deployment, &PatchParams::default(), &patch)
            .await
        {
            Ok(_) => {
                info!(allocation_id = %allocation_id, replicas, "Scaled workspace deployment");
                Ok(ScaleOutcome::Scaled)
            }
            Err(e) if is_not_found(&e) => {
                warn!(
                    allocation_id = %allocation_id,
                    deployment = %names.deployment,
                    "Deployment not found, nothing to scale"
                );
                Ok(ScaleOutcome::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, allocation_id: &AllocationId, wait: bool) -> Result<DeleteOutcome> {
        let names = self.names(allocation_id);
        let api: Api<Namespace> = Api::all(self.client.clone());

        match api.delete(&names.namespace, &DeleteParams::default()).await {
            Ok(_) => info!(namespace = %names.namespace, "Deleting workspace namespace"),
            Err(e) if is_not_found(&e) => {
                warn!(namespace = %names.namespace, "Namespace not found, already deleted");
                return Ok(DeleteOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        }

        if wait {
            let mut polls: u32 = 0;
            loop {
                match api.get_opt(&names.namespace).await {
                    Ok(None) => break,
                    Ok(Some(_)) => {}
                    Err(e) if is_not_found(&e) => break,
                    Err(e) => return Err(e.into()),
                }
                polls += 1;
                info!(namespace = %names.namespace, polls, "Waiting for namespace deletion");
                tokio::time::sleep(self.config.namespace_delete_poll).await;
            }
            info!(namespace = %names.namespace, "Namespace deleted");
        }

        Ok(DeleteOutcome::Deleted)
    }

    async fn workspace_status(
        &self,
        allocation_id: &AllocationId,
    ) -> Result<Option<ClusterStatus>> {
        let names = self.names(allocation_id);
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &names.namespace);

        let pods = match api.list(&ListParams::default()).await {
            Ok(pods) => pods,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(pods.items.first().and_then(status_from_pod))
    }

    async fn ping(&self) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.list(&ListParams::default().limit(1)).await?;
        Ok(())
    }
}

/// A mock provisioner for testing without a real Kubernetes cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    use crate::types::ResourceKind;
    use crate::ProvisionerError;

    /// One recorded call on the mock.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProvisionerCall {
        /// `apply` for an allocation.
        Apply(AllocationId),
        /// `scale` with the requested replica count.
        Scale(AllocationId, i32),
        /// `delete` with the wait flag.
        Delete(AllocationId, bool),
        /// `workspace_status` for an allocation.
        Status(AllocationId),
    }

    #[derive(Default)]
    struct MockState {
        objects: HashMap<AllocationId, HashSet<(ResourceKind, String)>>,
        replicas: HashMap<AllocationId, i32>,
        statuses: HashMap<AllocationId, Vec<Option<ClusterStatus>>>,
        calls: Vec<ProvisionerCall>,
        fail_scale: bool,
        fail_delete: bool,
    }

    /// A mock provisioner that keeps resource sets in memory.
    #[derive(Default)]
    pub struct MockProvisioner {
        config: ProvisionerConfig,
        state: Mutex<MockState>,
    }

    fn server_error() -> ProvisionerError {
        ProvisionerError::KubeApi(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "injected failure".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        }))
    }

    impl MockProvisioner {
        /// Create a new mock provisioner.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of objects currently held for an allocation.
        #[must_use]
        pub fn object_count(&self, allocation_id: &AllocationId) -> usize {
            self.state
                .lock()
                .objects
                .get(allocation_id)
                .map_or(0, HashSet::len)
        }

        /// Whether the allocation's namespace exists.
        #[must_use]
        pub fn has_namespace(&self, allocation_id: &AllocationId) -> bool {
            self.state.lock().objects.contains_key(allocation_id)
        }

        /// Current replica count of the allocation's deployment.
        #[must_use]
        pub fn replicas(&self, allocation_id: &AllocationId) -> Option<i32> {
            self.state.lock().replicas.get(allocation_id).copied()
        }

        /// Queue statuses returned by successive `workspace_status` calls.
        ///
        /// The last queued status repeats once the queue drains.
        pub fn script_statuses(&self, allocation_id: &AllocationId, statuses: Vec<Option<ClusterStatus>>) {
            self.state.lock().statuses.insert(*allocation_id, statuses);
        }

        /// Make every `scale` call fail with a server error.
        pub fn fail_scale(&self, fail: bool) {
            self.state.lock().fail_scale = fail;
        }

        /// Make every `delete` call fail with a server error.
        pub fn fail_delete(&self, fail: bool) {
            self.state.lock().fail_delete = fail;
        }

        /// All calls received so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<ProvisionerCall> {
            self.state.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Provisioner for MockProvisioner {
        async fn apply(&self, allocation: &WorkspaceAllocation) -> Result<ResourceSet> {
            let ctx = ManifestContext::new(allocation, &self.config);
            let id = allocation.allocation_id;
            let mut state = self.state.lock();
            state.calls.push(ProvisionerCall::Apply(id));

            let existing = state.objects.entry(id).or_default();
            let resources = WorkspaceResource::ALL
                .iter()
                .map(|resource| {
                    let name = resource.name(&ctx.names).to_string();
                    let outcome = if existing.insert((resource.kind(), name.clone())) {
                        ApplyOutcome::Created
                    } else {
                        ApplyOutcome::AlreadyExisted
                    };
                    AppliedResource {
                        kind: resource.kind(),
                        name,
                        outcome,
                    }
                })
                .collect();
            state.replicas.entry(id).or_insert(1);

            Ok(ResourceSet {
                namespace: ctx.names.namespace.clone(),
                resources,
            })
        }

        async fn scale(&self, allocation_id: &AllocationId, replicas: i32) -> Result<ScaleOutcome> {
            let mut state = self.state.lock();
            state.calls.push(ProvisionerCall::Scale(*allocation_id, replicas));
            if state.fail_scale {
                return Err(server_error());
            }
            match state.replicas.get_mut(allocation_id) {
                Some(current) => {
                    *current = replicas;
                    Ok(ScaleOutcome::Scaled)
                }
                None => Ok(ScaleOutcome::NotFound),
            }
        }

        async fn delete(&self, allocation_id: &AllocationId, wait: bool) -> Result<DeleteOutcome> {
            let mut state = self.state.lock();
            state.calls.push(ProvisionerCall::Delete(*allocation_id, wait));
            if state.fail_delete {
                return Err(server_error());
            }
            state.replicas.remove(allocation_id);
            if state.objects.remove(allocation_id).is_some() {
                Ok(DeleteOutcome::Deleted)
            } else {
                Ok(DeleteOutcome::NotFound)
            }
        }

        async fn workspace_status(
            &self,
            allocation_id: &AllocationId,
        ) -> Result<Option<ClusterStatus>> {
            let mut state = self.state.lock();
            state.calls.push(ProvisionerCall::Status(*allocation_id));
            let Some(queue) = state.statuses.get_mut(allocation_id) else {
                return Ok(None);
            };
            if queue.len() > 1 {
                Ok(queue.remove(0))
            } else {
                Ok(queue.first().copied().flatten())
            }
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockProvisioner, ProvisionerCall};
    use super::*;
    use crate::error::api_error;
    use chrono::Utc;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};
    use labspace_core::{AssignmentId, UserId};
    use labspace_store::WorkspaceSpec;

    fn allocation() -> WorkspaceAllocation {
        WorkspaceAllocation::new(
            AssignmentId::generate(),
            UserId::generate(),
            WorkspaceSpec::default(),
            Utc::now(),
        )
    }

    fn pod(phase: &str, ready: bool) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "workspace".to_string(),
                    ready,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn already_exists_is_success() {
        assert_eq!(
            tolerate_already_exists(Ok::<(), _>(())).unwrap(),
            ApplyOutcome::Created
        );
        assert_eq!(
            tolerate_already_exists::<()>(Err(api_error(409, "AlreadyExists"))).unwrap(),
            ApplyOutcome::AlreadyExisted
        );
        assert!(tolerate_already_exists::<()>(Err(api_error(409, "Conflict"))).is_err());
        assert!(tolerate_already_exists::<()>(Err(api_error(403, "Forbidden"))).is_err());
    }

    #[test]
    fn status_requires_ready_container() {
        assert_eq!(status_from_pod(&pod("Running", true)), Some(ClusterStatus::Running));
        assert_eq!(status_from_pod(&pod("Running", false)), None);
        assert_eq!(status_from_pod(&pod("Failed", true)), Some(ClusterStatus::Failed));
        assert_eq!(status_from_pod(&Pod::default()), None);
    }

    #[tokio::test]
    async fn mock_apply_is_idempotent() {
        let provisioner = MockProvisioner::new();
        let alloc = allocation();

        let first = provisioner.apply(&alloc).await.unwrap();
        assert_eq!(first.created_count(), WorkspaceResource::ALL.len());

        let second = provisioner.apply(&alloc).await.unwrap();
        assert_eq!(second.created_count(), 0);
        assert_eq!(
            provisioner.object_count(&alloc.allocation_id),
            WorkspaceResource::ALL.len()
        );
        assert_eq!(first.namespace, second.namespace);
    }

    #[tokio::test]
    async fn mock_scale_and_delete() {
        let provisioner = MockProvisioner::new();
        let alloc = allocation();
        let id = alloc.allocation_id;

        assert_eq!(provisioner.scale(&id, 0).await.unwrap(), ScaleOutcome::NotFound);

        provisioner.apply(&alloc).await.unwrap();
        assert_eq!(provisioner.replicas(&id), Some(1));
        assert_eq!(provisioner.scale(&id, 0).await.unwrap(), ScaleOutcome::Scaled);
        assert_eq!(provisioner.replicas(&id), Some(0));

        assert_eq!(provisioner.delete(&id, true).await.unwrap(), DeleteOutcome::Deleted);
        assert!(!provisioner.has_namespace(&id));
        assert_eq!(provisioner.delete(&id, true).await.unwrap(), DeleteOutcome::NotFound);

        assert_eq!(
            provisioner.calls()[..2],
            [ProvisionerCall::Scale(id, 0), ProvisionerCall::Apply(id)]
        );
    }

    #[tokio::test]
    async fn mock_injected_failures_are_retriable() {
        let provisioner = MockProvisioner::new();
        let alloc = allocation();
        provisioner.apply(&alloc).await.unwrap();
        provisioner.fail_scale(true);

        let err = provisioner.scale(&alloc.allocation_id, 0).await.unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(provisioner.replicas(&alloc.allocation_id), Some(1));
    }

    /// `K8sProvisioner` against an HTTP server speaking the Kubernetes API.
    mod cluster {
        use super::*;
        use std::time::Duration;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn provisioner(server: &MockServer) -> K8sProvisioner {
            let config = kube::Config::new(server.uri().parse().unwrap());
            let client = Client::try_from(config).unwrap();
            let config = ProvisionerConfig {
                namespace_delete_poll: Duration::from_millis(10),
                ..ProvisionerConfig::default()
            };
            K8sProvisioner::with_client(client, config)
        }

        fn status(code: u16, reason: &str) -> ResponseTemplate {
            ResponseTemplate::new(code).set_body_json(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": format!("{reason} from test server"),
                "reason": reason,
                "code": code,
            }))
        }

        fn namespace(name: &str) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(json!({
                "kind": "Namespace",
                "apiVersion": "v1",
                "metadata": { "name": name },
                "status": { "phase": "Terminating" },
            }))
        }

        #[tokio::test]
        async fn apply_over_existing_objects_succeeds() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(status(409, "AlreadyExists"))
                .expect(7)
                .mount(&server)
                .await;

            let set = provisioner(&server).apply(&allocation()).await.unwrap();

            assert_eq!(set.resources.len(), WorkspaceResource::ALL.len());
            assert_eq!(set.created_count(), 0);
            assert!(set
                .resources
                .iter()
                .all(|r| r.outcome == ApplyOutcome::AlreadyExisted));
        }

        #[tokio::test]
        async fn apply_stops_on_rejected_object() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(status(403, "Forbidden"))
                .expect(1)
                .mount(&server)
                .await;

            let err = provisioner(&server).apply(&allocation()).await.unwrap_err();

            assert!(!err.is_retriable());
        }

        #[tokio::test]
        async fn scale_of_missing_deployment_is_not_found() {
            let server = MockServer::start().await;
            let alloc = allocation();
            let names = WorkspaceNames::new(&ProvisionerConfig::default().namespace_prefix, &alloc.allocation_id);
            Mock::given(method("PATCH"))
                .and(path(format!(
                    "/apis/apps/v1/namespaces/{}/deployments/{}/scale",
                    names.namespace, names.deployment
                )))
                .respond_with(status(404, "NotFound"))
                .expect(1)
                .mount(&server)
                .await;

            let outcome = provisioner(&server)
                .scale(&alloc.allocation_id, 0)
                .await
                .unwrap();

            assert_eq!(outcome, ScaleOutcome::NotFound);
        }

        #[tokio::test]
        async fn delete_with_wait_polls_until_namespace_is_gone() {
            let server = MockServer::start().await;
            let alloc = allocation();
            let ns = WorkspaceNames::new(&ProvisionerConfig::default().namespace_prefix, &alloc.allocation_id).namespace;
            let ns_path = format!("/api/v1/namespaces/{ns}");

            Mock::given(method("DELETE"))
                .and(path(ns_path.as_str()))
                .respond_with(namespace(&ns))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(ns_path.as_str()))
                .respond_with(namespace(&ns))
                .up_to_n_times(2)
                .with_priority(1)
                .expect(2)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(ns_path.as_str()))
                .respond_with(status(404, "NotFound"))
                .expect(1)
                .mount(&server)
                .await;

            let outcome = provisioner(&server)
                .delete(&alloc.allocation_id, true)
                .await
                .unwrap();

            assert_eq!(outcome, DeleteOutcome::Deleted);
            let gets = server
                .received_requests()
                .await
                .unwrap()
                .iter()
                .filter(|r| r.method == wiremock::http::Method::GET)
                .count();
            assert_eq!(gets, 3);
        }

        #[tokio::test]
        async fn delete_of_missing_namespace_does_not_wait() {
            let server = MockServer::start().await;
            Mock::given(method("DELETE"))
                .respond_with(status(404, "NotFound"))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .respond_with(status(404, "NotFound"))
                .expect(0)
                .mount(&server)
                .await;

            let outcome = provisioner(&server)
                .delete(&allocation().allocation_id, true)
                .await
                .unwrap();

            assert_eq!(outcome, DeleteOutcome::NotFound);
        }
    }
}
