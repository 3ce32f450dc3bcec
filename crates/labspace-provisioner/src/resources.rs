//! Manifests for the cluster objects that make up one workspace.
//!
//! Each object is a [`WorkspaceResource`] variant. A variant knows how to build
//! its manifest from a [`ManifestContext`]; the provisioner decides how to apply
//! it. Names come from [`WorkspaceNames`], so building the same allocation twice
//! yields identical manifests.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    AWSElasticBlockStoreVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvFromSource,
    EnvVar, HTTPGetAction, Namespace, PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Secret,
    SecretEnvSource, SecurityContext, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use serde_json::json;

use labspace_core::naming::{workspace_labels, ALLOCATION_LABEL, POD_KIND_LABEL, POD_KIND_WORKSPACE};
use labspace_core::WorkspaceNames;
use labspace_store::WorkspaceAllocation;

use crate::types::{ProvisionerConfig, ResourceKind};

/// Port the workspace editor listens on.
pub const WORKSPACE_PORT: i32 = 8080;

const WORKSPACE_UID: i64 = 1000;
const WORKSPACE_GID: i64 = 1000;
const HOME_MOUNT_PATH: &str = "/home/coder";
const HOME_SUB_PATH: &str = "user-home";
const GPU_RESOURCE: &str = "nvidia.com/gpu";
const TRAEFIK_GROUP: &str = "traefik.containo.us";
const TRAEFIK_VERSION: &str = "v1alpha1";

/// One object of a workspace's resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceResource {
    /// The workspace namespace.
    Namespace,
    /// Secret with the workspace password.
    Secret,
    /// `ClusterIP` service in front of the pod.
    Service,
    /// Deployment running the workspace container.
    Deployment,
    /// Middleware stripping the `/workspace/<slug>` prefix.
    StripPrefixMiddleware,
    /// Middleware delegating authorization to the web service.
    ForwardAuthMiddleware,
    /// Routing rule tying paths to the service and middlewares.
    IngressRoute,
}

impl WorkspaceResource {
    /// All resources in apply order. The namespace must exist before anything inside it.
    pub const ALL: [Self; 7] = [
        Self::Namespace,
        Self::Secret,
        Self::Service,
        Self::Deployment,
        Self::StripPrefixMiddleware,
        Self::ForwardAuthMiddleware,
        Self::IngressRoute,
    ];

    /// The kind reported in a resource set.
    #[must_use]
    pub const fn kind(self) -> ResourceKind {
        match self {
            Self::Namespace => ResourceKind::Namespace,
            Self::Secret => ResourceKind::Secret,
            Self::Service => ResourceKind::Service,
            Self::Deployment => ResourceKind::Deployment,
            Self::StripPrefixMiddleware => ResourceKind::StripPrefixMiddleware,
            Self::ForwardAuthMiddleware => ResourceKind::ForwardAuthMiddleware,
            Self::IngressRoute => ResourceKind::IngressRoute,
        }
    }

    /// Object name for this resource.
    #[must_use]
    pub fn name(self, names: &WorkspaceNames) -> &str {
        match self {
            Self::Namespace => &names.namespace,
            Self::Secret => &names.secret,
            Self::Service => &names.service,
            Self::Deployment => &names.deployment,
            Self::StripPrefixMiddleware => &names.strip_prefix_middleware,
            Self::ForwardAuthMiddleware => &names.forward_auth_middleware,
            Self::IngressRoute => &names.ingress_route,
        }
    }

    /// Build the manifest for this resource.
    #[must_use]
    pub fn manifest(self, ctx: &ManifestContext<'_>) -> Manifest {
        match self {
            Self::Namespace => Manifest::Namespace(build_namespace(ctx)),
            Self::Secret => Manifest::Secret(build_secret(ctx)),
            Self::Service => Manifest::Service(build_service(ctx)),
            Self::Deployment => Manifest::Deployment(Box::new(build_deployment(ctx))),
            Self::StripPrefixMiddleware => Manifest::Custom {
                resource: middleware_resource(),
                object: build_strip_prefix_middleware(ctx),
            },
            Self::ForwardAuthMiddleware => Manifest::Custom {
                resource: middleware_resource(),
                object: build_forward_auth_middleware(ctx),
            },
            Self::IngressRoute => Manifest::Custom {
                resource: ingress_route_resource(),
                object: build_ingress_route(ctx),
            },
        }
    }
}

/// A typed API object ready to be created.
#[derive(Debug, Clone)]
pub enum Manifest {
    /// Cluster-scoped namespace.
    Namespace(Namespace),
    /// Namespaced secret.
    Secret(Secret),
    /// Namespaced service.
    Service(Service),
    /// Namespaced deployment.
    Deployment(Box<Deployment>),
    /// Namespaced custom object (Traefik CRDs).
    Custom {
        /// Group/version/plural of the custom resource.
        resource: ApiResource,
        /// The object itself.
        object: DynamicObject,
    },
}

/// Inputs shared by all manifest builders.
pub struct ManifestContext<'a> {
    /// The allocation being provisioned.
    pub allocation: &'a WorkspaceAllocation,
    /// Derived object names.
    pub names: WorkspaceNames,
    /// Provisioner settings.
    pub config: &'a ProvisionerConfig,
}

impl<'a> ManifestContext<'a> {
    /// Create a context for an allocation.
    #[must_use]
    pub fn new(allocation: &'a WorkspaceAllocation, config: &'a ProvisionerConfig) -> Self {
        Self {
            names: WorkspaceNames::new(&config.namespace_prefix, &allocation.allocation_id),
            allocation,
            config,
        }
    }

    fn route_prefix(&self) -> String {
        format!("/workspace/{}", self.allocation.url_slug)
    }
}

fn named(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn build_namespace(ctx: &ManifestContext<'_>) -> Namespace {
    let mut labels = BTreeMap::new();
    labels.insert("name".to_string(), ctx.names.namespace.clone());

    Namespace {
        metadata: ObjectMeta {
            labels: Some(labels),
            ..named(&ctx.names.namespace)
        },
        ..Default::default()
    }
}

fn build_secret(ctx: &ManifestContext<'_>) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        "PASSWORD".to_string(),
        ByteString(ctx.config.default_password.clone().into_bytes()),
    );

    Secret {
        metadata: named(&ctx.names.secret),
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

fn build_service(ctx: &ManifestContext<'_>) -> Service {
    let mut selector = BTreeMap::new();
    selector.insert("app".to_string(), ctx.names.namespace.clone());

    Service {
        metadata: named(&ctx.names.service),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                protocol: Some("TCP".to_string()),
                port: WORKSPACE_PORT,
                target_port: Some(IntOrString::Int(WORKSPACE_PORT)),
                ..Default::default()
            }]),
            selector: Some(selector),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_deployment(ctx: &ManifestContext<'_>) -> Deployment {
    let labels = workspace_labels(&ctx.names.namespace, &ctx.allocation.meta());

    let mut pod_labels = labels.clone();
    pod_labels.insert(POD_KIND_LABEL.to_string(), POD_KIND_WORKSPACE.to_string());

    let mut match_labels = BTreeMap::new();
    match_labels.insert(
        ALLOCATION_LABEL.to_string(),
        ctx.allocation.allocation_id.to_hex(),
    );

    Deployment {
        metadata: ObjectMeta {
            labels: Some(labels),
            ..named(&ctx.names.deployment)
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(match_labels),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(build_pod_spec(ctx)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pod_spec(ctx: &ManifestContext<'_>) -> PodSpec {
    PodSpec {
        automount_service_account_token: Some(false),
        containers: vec![build_workspace_container(ctx)],
        init_containers: Some(vec![build_init_container(ctx)]),
        volumes: Some(vec![build_home_volume(ctx)]),
        node_selector: build_node_selector(ctx),
        ..Default::default()
    }
}

fn home_volume_name(ctx: &ManifestContext<'_>) -> String {
    format!("user-volume-{}", ctx.names.namespace)
}

fn build_home_mount(ctx: &ManifestContext<'_>) -> VolumeMount {
    VolumeMount {
        name: home_volume_name(ctx),
        mount_path: HOME_MOUNT_PATH.to_string(),
        sub_path: Some(HOME_SUB_PATH.to_string()),
        ..Default::default()
    }
}

fn build_workspace_container(ctx: &ManifestContext<'_>) -> Container {
    Container {
        name: ctx.names.container.clone(),
        image: Some(ctx.allocation.spec.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(
            [
                "bash",
                "/usr/bin/entrypoint.sh",
                "--auth",
                "none",
                "--disable-update-check",
                "--disable-telemetry",
                "--bind-addr",
                &format!("0.0.0.0:{WORKSPACE_PORT}"),
                &ctx.config.user_assignment_folder,
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        ),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: ctx.names.secret.clone().into(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        env: Some(vec![
            env_var("PUID", &WORKSPACE_UID.to_string()),
            env_var("PGID", &WORKSPACE_GID.to_string()),
        ]),
        ports: Some(vec![ContainerPort {
            container_port: WORKSPACE_PORT,
            name: Some("http".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(build_readiness_probe()),
        resources: Some(build_resources(ctx, true)),
        volume_mounts: Some(vec![build_home_mount(ctx)]),
        security_context: Some(SecurityContext {
            run_as_user: Some(WORKSPACE_UID),
            run_as_group: Some(WORKSPACE_GID),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_init_container(ctx: &ManifestContext<'_>) -> Container {
    let mut command = vec!["python".to_string(), "init-container.py".to_string()];
    if let Some(repo) = &ctx.allocation.spec.code_repo {
        command.push("--repo".to_string());
        command.push(repo.clone());
    }
    command.push(if ctx.allocation.debug { "--debug" } else { "--no-debug" }.to_string());

    Container {
        name: "init-workspace".to_string(),
        image: Some(ctx.config.init_container_image.clone()),
        image_pull_policy: Some("Always".to_string()),
        command: Some(command),
        env: Some(vec![
            env_var("WS_PUID", &WORKSPACE_UID.to_string()),
            env_var("WS_PGID", &WORKSPACE_GID.to_string()),
            env_var("GH_ACCESS_TOKEN", &ctx.config.github_access_token),
        ]),
        // Init containers get the same budget so scheduling is driven by one figure.
        resources: Some(build_resources(ctx, false)),
        volume_mounts: Some(vec![build_home_mount(ctx)]),
        ..Default::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn build_readiness_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/healthz".to_string()),
            port: IntOrString::Int(WORKSPACE_PORT),
            ..Default::default()
        }),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(2),
        ..Default::default()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millicores(cpus: f64) -> Quantity {
    Quantity(format!("{}m", (cpus * 1000.0).round() as i64))
}

#[allow(clippy::cast_possible_truncation)]
fn mebibytes(gib: f64) -> Quantity {
    Quantity(format!("{}Mi", (gib * 1024.0).round() as i64))
}

/// Requests sit below the baseline and limits above it; GPU workspaces also
/// get a device-count limit.
fn build_resources(ctx: &ManifestContext<'_>, with_gpu: bool) -> ResourceRequirements {
    let spec = &ctx.allocation.spec;
    let config = ctx.config;

    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), millicores(spec.cpus * config.cpu_request_multiplier));
    requests.insert(
        "memory".to_string(),
        mebibytes(spec.memory_gib * config.memory_request_multiplier),
    );

    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), millicores(spec.cpus * config.cpu_burst_multiplier));
    limits.insert(
        "memory".to_string(),
        mebibytes(spec.memory_gib * config.memory_burst_multiplier),
    );
    if with_gpu && spec.gpus > 0 {
        limits.insert(GPU_RESOURCE.to_string(), Quantity(spec.gpus.to_string()));
    }

    ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

fn build_node_selector(ctx: &ManifestContext<'_>) -> Option<BTreeMap<String, String>> {
    if !ctx.config.enable_node_selectors {
        return None;
    }
    let group = if ctx.allocation.spec.gpus > 0 {
        &ctx.config.gpu_node_group
    } else {
        &ctx.config.cpu_node_group
    };
    let mut selector = BTreeMap::new();
    selector.insert(ctx.config.node_group_label.clone(), group.clone());
    Some(selector)
}

fn build_home_volume(ctx: &ManifestContext<'_>) -> Volume {
    let name = home_volume_name(ctx);
    match &ctx.allocation.volume {
        Some(volume) => Volume {
            name,
            aws_elastic_block_store: Some(AWSElasticBlockStoreVolumeSource {
                volume_id: volume.volume_id.clone(),
                fs_type: Some("ext4".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        None => Volume {
            name,
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    }
}

fn middleware_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TRAEFIK_GROUP, TRAEFIK_VERSION, "Middleware"),
        "middlewares",
    )
}

fn ingress_route_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TRAEFIK_GROUP, TRAEFIK_VERSION, "IngressRoute"),
        "ingressroutes",
    )
}

fn build_strip_prefix_middleware(ctx: &ManifestContext<'_>) -> DynamicObject {
    DynamicObject::new(&ctx.names.strip_prefix_middleware, &middleware_resource())
        .within(&ctx.names.namespace)
        .data(json!({
            "spec": { "stripPrefix": { "prefixes": [ctx.route_prefix()] } }
        }))
}

/// Forward-auth address for an allocation: `<base>/lti/workspace/<allocation>/auth/`.
#[must_use]
pub fn forward_auth_address(base_url: &str, allocation: &WorkspaceAllocation) -> String {
    format!(
        "{}/lti/workspace/{}/auth/",
        base_url.trim_end_matches('/'),
        allocation.allocation_id
    )
}

fn build_forward_auth_middleware(ctx: &ManifestContext<'_>) -> DynamicObject {
    DynamicObject::new(&ctx.names.forward_auth_middleware, &middleware_resource())
        .within(&ctx.names.namespace)
        .data(json!({
            "spec": {
                "forwardAuth": {
                    "address": forward_auth_address(&ctx.config.auth_base_url, ctx.allocation)
                }
            }
        }))
}

fn build_ingress_route(ctx: &ManifestContext<'_>) -> DynamicObject {
    let prefix = ctx.route_prefix();
    let service = json!([{ "name": ctx.names.service, "port": "http" }]);
    let strip = json!({ "name": ctx.names.strip_prefix_middleware });
    let auth = json!({ "name": ctx.names.forward_auth_middleware });

    let rule = |path: String, middlewares: serde_json::Value| {
        json!({
            "match": format!("PathPrefix(`{path}`)"),
            "kind": "Rule",
            "services": service,
            "middlewares": middlewares,
        })
    };

    // Static assets skip authorization; everything else under the prefix is authorized.
    let routes = vec![
        rule(format!("{prefix}/static"), json!([strip])),
        rule(format!("{prefix}/_static"), json!([strip])),
        rule("/vs/workbench".to_string(), json!([auth])),
        rule(prefix.clone(), json!([strip, auth])),
    ];

    DynamicObject::new(&ctx.names.ingress_route, &ingress_route_resource())
        .within(&ctx.names.namespace)
        .data(json!({
            "spec": {
                "entryPoints": [ctx.config.ingress_entrypoint],
                "routes": routes,
            }
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use labspace_core::{AssignmentId, UserId};
    use labspace_store::{VolumeDescriptor, WorkspaceSpec};

    fn allocation(spec: WorkspaceSpec) -> WorkspaceAllocation {
        WorkspaceAllocation::new(AssignmentId::generate(), UserId::generate(), spec, Utc::now())
    }

    fn deployment_of(alloc: &WorkspaceAllocation, config: &ProvisionerConfig) -> Deployment {
        let ctx = ManifestContext::new(alloc, config);
        match WorkspaceResource::Deployment.manifest(&ctx) {
            Manifest::Deployment(d) => *d,
            other => panic!("unexpected manifest {other:?}"),
        }
    }

    fn custom_of(resource: WorkspaceResource, ctx: &ManifestContext<'_>) -> DynamicObject {
        match resource.manifest(ctx) {
            Manifest::Custom { object, .. } => object,
            other => panic!("unexpected manifest {other:?}"),
        }
    }

    #[test]
    fn resource_names_derive_from_namespace() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig::default();
        let ctx = ManifestContext::new(&alloc, &config);

        let ns = format!("wa-{}", alloc.allocation_id);
        for resource in WorkspaceResource::ALL {
            let name = resource.name(&ctx.names);
            assert!(name.ends_with(&ns), "{resource:?} named {name}");
        }
        assert_eq!(WorkspaceResource::ALL[0], WorkspaceResource::Namespace);
    }

    #[test]
    fn deployment_has_workspace_shape() {
        let alloc = allocation(WorkspaceSpec {
            code_repo: Some("https://github.com/org/repo".to_string()),
            ..Default::default()
        });
        let config = ProvisionerConfig::default();
        let deployment = deployment_of(&alloc, &config);
        let ns = format!("wa-{}", alloc.allocation_id);

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.strategy.unwrap().type_.as_deref(), Some("Recreate"));

        let template_labels = spec.template.metadata.unwrap().labels.unwrap();
        assert_eq!(template_labels.get("pod").map(String::as_str), Some("workspace"));
        assert_eq!(template_labels.get("app"), Some(&ns));

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.automount_service_account_token, Some(false));
        assert!(pod.node_selector.is_none());

        let container = &pod.containers[0];
        assert_eq!(container.name, ns);
        let probe = container.readiness_probe.as_ref().unwrap();
        assert_eq!(
            probe.http_get.as_ref().unwrap().path.as_deref(),
            Some("/healthz")
        );
        assert_eq!(probe.failure_threshold, Some(2));
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, "/home/coder");
        assert_eq!(mount.sub_path.as_deref(), Some("user-home"));

        let init = &pod.init_containers.unwrap()[0];
        assert_eq!(init.name, "init-workspace");
        let command = init.command.as_ref().unwrap();
        assert!(command.contains(&"--repo".to_string()));
        assert_eq!(command.last().map(String::as_str), Some("--no-debug"));

        let volume = &pod.volumes.unwrap()[0];
        assert!(volume.empty_dir.is_some());
    }

    #[test]
    fn resources_bracket_the_baseline() {
        let alloc = allocation(WorkspaceSpec {
            cpus: 2.0,
            memory_gib: 4.0,
            ..Default::default()
        });
        let config = ProvisionerConfig::default();
        let deployment = deployment_of(&alloc, &config);
        let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];
        let resources = container.resources.as_ref().unwrap();

        let requests = resources.requests.as_ref().unwrap();
        assert_eq!(requests.get("cpu"), Some(&Quantity("1500m".to_string())));
        assert_eq!(requests.get("memory"), Some(&Quantity("3686Mi".to_string())));

        let limits = resources.limits.as_ref().unwrap();
        assert_eq!(limits.get("cpu"), Some(&Quantity("4000m".to_string())));
        assert_eq!(limits.get("memory"), Some(&Quantity("4915Mi".to_string())));
        assert!(!limits.contains_key(GPU_RESOURCE));
    }

    #[test]
    fn gpu_workspace_targets_gpu_pool() {
        let alloc = allocation(WorkspaceSpec {
            gpus: 1,
            ..Default::default()
        });
        let config = ProvisionerConfig {
            enable_node_selectors: true,
            ..Default::default()
        };
        let pod = deployment_of(&alloc, &config)
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();

        let selector = pod.node_selector.unwrap();
        assert_eq!(
            selector.get(&config.node_group_label),
            Some(&config.gpu_node_group)
        );
        let limits = pod.containers[0]
            .resources
            .as_ref()
            .unwrap()
            .limits
            .clone()
            .unwrap();
        assert_eq!(limits.get(GPU_RESOURCE), Some(&Quantity("1".to_string())));

        let init_limits = pod.init_containers.unwrap()[0]
            .resources
            .as_ref()
            .unwrap()
            .limits
            .clone()
            .unwrap();
        assert!(!init_limits.contains_key(GPU_RESOURCE));
    }

    #[test]
    fn cpu_workspace_targets_cpu_pool_when_enabled() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig {
            enable_node_selectors: true,
            ..Default::default()
        };
        let pod = deployment_of(&alloc, &config)
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();
        assert_eq!(
            pod.node_selector.unwrap().get(&config.node_group_label),
            Some(&config.cpu_node_group)
        );
    }

    #[test]
    fn persistent_volume_attaches_as_ebs() {
        let mut alloc = allocation(WorkspaceSpec::default());
        alloc.volume = Some(VolumeDescriptor {
            volume_id: "vol-123".to_string(),
            availability_zone: "eu-west-1a".to_string(),
        });
        alloc.debug = true;
        let config = ProvisionerConfig::default();
        let pod = deployment_of(&alloc, &config)
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();

        let ebs = pod.volumes.unwrap()[0].aws_elastic_block_store.clone().unwrap();
        assert_eq!(ebs.volume_id, "vol-123");
        assert_eq!(ebs.fs_type.as_deref(), Some("ext4"));

        let init = &pod.init_containers.unwrap()[0];
        assert_eq!(
            init.command.as_ref().unwrap().last().map(String::as_str),
            Some("--debug")
        );
    }

    #[test]
    fn service_selects_workspace_pod() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig::default();
        let ctx = ManifestContext::new(&alloc, &config);
        let Manifest::Service(service) = WorkspaceResource::Service.manifest(&ctx) else {
            panic!("expected service");
        };
        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.ports.unwrap()[0].port, WORKSPACE_PORT);
        assert_eq!(
            spec.selector.unwrap().get("app"),
            Some(&ctx.names.namespace)
        );
    }

    #[test]
    fn secret_carries_password() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig {
            default_password: "hunter2".to_string(),
            ..Default::default()
        };
        let ctx = ManifestContext::new(&alloc, &config);
        let Manifest::Secret(secret) = WorkspaceResource::Secret.manifest(&ctx) else {
            panic!("expected secret");
        };
        let data = secret.data.unwrap();
        assert_eq!(data.get("PASSWORD"), Some(&ByteString(b"hunter2".to_vec())));
    }

    #[test]
    fn ingress_route_authorizes_all_but_static_assets() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig::default();
        let ctx = ManifestContext::new(&alloc, &config);
        let route = custom_of(WorkspaceResource::IngressRoute, &ctx);

        let routes = route.data["spec"]["routes"].as_array().unwrap().clone();
        assert_eq!(routes.len(), 4);

        let prefix = format!("/workspace/{}", alloc.url_slug);
        let auth_name = ctx.names.forward_auth_middleware.as_str();
        for route in &routes {
            let matcher = route["match"].as_str().unwrap();
            let middlewares: Vec<&str> = route["middlewares"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m["name"].as_str().unwrap())
                .collect();
            let is_static = matcher.contains("static`)");
            assert_eq!(middlewares.contains(&auth_name), !is_static, "{matcher}");
        }
        assert_eq!(
            routes[3]["match"].as_str().unwrap(),
            format!("PathPrefix(`{prefix}`)")
        );
        assert_eq!(route.data["spec"]["entryPoints"][0], "web");
    }

    #[test]
    fn forward_auth_points_at_allocation() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig {
            auth_base_url: "https://labs.example.edu/".to_string(),
            ..Default::default()
        };
        let ctx = ManifestContext::new(&alloc, &config);
        let middleware = custom_of(WorkspaceResource::ForwardAuthMiddleware, &ctx);
        assert_eq!(
            middleware.data["spec"]["forwardAuth"]["address"],
            format!(
                "https://labs.example.edu/lti/workspace/{}/auth/",
                alloc.allocation_id
            )
        );
    }

    #[test]
    fn manifests_are_deterministic() {
        let alloc = allocation(WorkspaceSpec::default());
        let config = ProvisionerConfig::default();
        let a = ManifestContext::new(&alloc, &config);
        let b = ManifestContext::new(&alloc, &config);
        let first = serde_json::to_value(custom_of(WorkspaceResource::IngressRoute, &a)).unwrap();
        let second = serde_json::to_value(custom_of(WorkspaceResource::IngressRoute, &b)).unwrap();
        assert_eq!(first, second);
    }
}
