//! Cluster access used by the watcher.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::{Event, Namespace, Pod};
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::Client;

/// A stream of watch events for cluster `Event` objects.
pub type EventStream<'a> = BoxStream<'a, kube::Result<WatchEvent<Event>>>;

/// Opens watch subscriptions.
pub trait EventSource: Send + Sync {
    /// Open a new subscription from the beginning of the server's event window.
    fn subscribe(&self) -> BoxFuture<'_, kube::Result<EventStream<'_>>>;
}

/// Reads pods by name.
#[async_trait]
pub trait PodLookup: Send + Sync {
    /// Fetch a pod, or `None` if it no longer exists.
    async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>>;
}

/// Cluster-wide `Event` watch with a server-side field selector.
pub struct KubeEventSource {
    api: Api<Event>,
    params: WatchParams,
}

impl KubeEventSource {
    /// Watch events matching `field_selector` in all namespaces.
    #[must_use]
    pub fn new(client: Client, field_selector: &str) -> Self {
        Self {
            api: Api::all(client),
            params: WatchParams::default().fields(field_selector),
        }
    }
}

impl EventSource for KubeEventSource {
    fn subscribe(&self) -> BoxFuture<'_, kube::Result<EventStream<'_>>> {
        async move {
            let stream = self.api.watch(&self.params, "0").await?;
            Ok(stream.boxed())
        }
        .boxed()
    }
}

/// Pod reads through the cluster API.
#[derive(Clone)]
pub struct KubePodLookup {
    client: Client,
}

impl KubePodLookup {
    /// Create a lookup over `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Check that the cluster API is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if namespaces cannot be listed.
    pub async fn ping(&self) -> kube::Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.list(&ListParams::default().limit(1)).await?;
        Ok(())
    }
}

#[async_trait]
impl PodLookup for KubePodLookup {
    async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }
}

/// Scripted sources for testing without a cluster.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Replays one scripted batch of watch items per subscription.
    ///
    /// Once the script is exhausted, further subscriptions fail with a
    /// server error so a test never loops forever.
    #[derive(Default)]
    pub struct ScriptedEventSource {
        scripts: Mutex<VecDeque<Vec<kube::Result<WatchEvent<Event>>>>>,
        subscriptions: Mutex<u32>,
    }

    impl ScriptedEventSource {
        /// Create a source from per-subscription batches.
        #[must_use]
        pub fn new(scripts: Vec<Vec<kube::Result<WatchEvent<Event>>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                subscriptions: Mutex::new(0),
            }
        }

        /// Number of subscriptions opened so far.
        #[must_use]
        pub fn subscriptions(&self) -> u32 {
            *self.subscriptions.lock()
        }
    }

    impl EventSource for ScriptedEventSource {
        fn subscribe(&self) -> BoxFuture<'_, kube::Result<EventStream<'_>>> {
            *self.subscriptions.lock() += 1;
            let next = self.scripts.lock().pop_front();
            async move {
                match next {
                    Some(items) => Ok(futures::stream::iter(items).boxed()),
                    None => Err(kube::Error::Api(kube::core::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "script exhausted".to_string(),
                        reason: "InternalError".to_string(),
                        code: 500,
                    })),
                }
            }
            .boxed()
        }
    }

    /// In-memory pods keyed by namespace and name.
    #[derive(Default)]
    pub struct MockPodLookup {
        pods: Mutex<HashMap<(String, String), Pod>>,
    }

    impl MockPodLookup {
        /// Create an empty lookup.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add or replace a pod.
        pub fn insert(&self, namespace: &str, name: &str, pod: Pod) {
            self.pods
                .lock()
                .insert((namespace.to_string(), name.to_string()), pod);
        }
    }

    #[async_trait]
    impl PodLookup for MockPodLookup {
        async fn get_pod(&self, namespace: &str, name: &str) -> kube::Result<Option<Pod>> {
            Ok(self
                .pods
                .lock()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        }
    }
}
