//! The cluster watcher loop.

use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::api::WatchEvent;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use labspace_broker::EventPublisher;
use labspace_core::naming::{is_workspace_namespace, meta_from_labels};
use labspace_core::DomainEvent;

use crate::classify::{event_timestamp, log_container_statuses, routing_key_for, workspace_container};
use crate::config::WatcherConfig;
use crate::error::is_not_found;
use crate::source::{EventSource, EventStream, PodLookup};
use crate::state::{WatchSignal, WatchState};
use crate::{Result, WatcherError};

/// What handling one event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A domain event was published under this routing key.
    Published(&'static str),
    /// The event was ignored.
    Skipped(SkipReason),
}

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Observed before the current subscription started.
    Stale,
    /// Outside the workspace namespaces.
    NotWorkspace,
    /// The pod no longer exists.
    PodGone,
    /// The pod lacks the workspace labels or containers.
    MissingMetadata,
    /// The reason is not a lifecycle transition.
    NotLifecycle,
}

/// Start time of a subscription opened at `now`.
///
/// Event timestamps have whole-second precision, so the start is truncated
/// to the second; events from the same second are kept.
#[must_use]
pub fn subscription_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(0)
}

/// Watches pod events and publishes workspace lifecycle events.
pub struct ClusterWatcher<S, L, P> {
    source: S,
    pods: L,
    publisher: P,
    config: WatcherConfig,
    state: Mutex<WatchState>,
}

impl<S, L, P> ClusterWatcher<S, L, P>
where
    S: EventSource,
    L: PodLookup,
    P: EventPublisher,
{
    /// Create a watcher.
    pub fn new(source: S, pods: L, publisher: P, config: WatcherConfig) -> Self {
        Self {
            source,
            pods,
            publisher,
            config,
            state: Mutex::new(WatchState::Resubscribing),
        }
    }

    /// Current subscription state.
    #[must_use]
    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    fn transition(&self, signal: WatchSignal) -> WatchState {
        let mut state = self.state.lock();
        *state = state.on(signal);
        *state
    }

    /// Run until an unrecoverable error.
    ///
    /// Expired cursors and closed streams lead to a fresh subscription; events
    /// older than that subscription are dropped.
    ///
    /// # Errors
    ///
    /// Returns the error that moved the watcher to [`WatchState::Failed`], or
    /// [`WatcherError::Stopped`] if it had already failed.
    pub async fn run(&self) -> Result<()> {
        info!(prefix = %self.config.namespace_prefix, "Starting cluster watcher");
        let mut stream = None;
        let mut started_at = subscription_start(Utc::now());

        loop {
            let step = match self.state() {
                WatchState::Resubscribing => self.resubscribe(&mut stream, &mut started_at).await,
                WatchState::Streaming => self.drain(&mut stream, started_at).await,
                WatchState::Failed => return Err(WatcherError::Stopped),
            };

            match step {
                Ok(signal) => {
                    let state = self.transition(signal);
                    debug!(?signal, ?state, %started_at, "Watch state changed");
                }
                Err(e) => {
                    let state = self.transition(WatchSignal::Fatal);
                    error!(error = %e, ?state, "Cluster watcher failed");
                    return Err(e);
                }
            }
        }
    }

    /// Open a subscription, recording its start time.
    async fn resubscribe<'a>(
        &'a self,
        stream: &mut Option<EventStream<'a>>,
        started_at: &mut DateTime<Utc>,
    ) -> Result<WatchSignal> {
        *started_at = subscription_start(Utc::now());
        match self.source.subscribe().await {
            Ok(opened) => {
                *stream = Some(opened);
                Ok(WatchSignal::Subscribed)
            }
            Err(e) if WatchSignal::from_error(&e) == WatchSignal::Gone => {
                info!(error = %e, "Watch cursor expired while subscribing, retrying");
                Ok(WatchSignal::Gone)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle events until the subscription ends. Returns why it ended.
    async fn drain(
        &self,
        stream: &mut Option<EventStream<'_>>,
        started_at: DateTime<Utc>,
    ) -> Result<WatchSignal> {
        let Some(events) = stream.as_mut() else {
            return Ok(WatchSignal::Closed);
        };

        let signal = loop {
            let Some(item) = events.next().await else {
                break WatchSignal::Closed;
            };
            let event = match item {
                Ok(WatchEvent::Added(event) | WatchEvent::Modified(event)) => event,
                Ok(WatchEvent::Deleted(_) | WatchEvent::Bookmark(_)) => continue,
                Ok(WatchEvent::Error(response)) => {
                    if WatchSignal::from_response(&response) == WatchSignal::Gone {
                        info!(message = %response.message, "Watch cursor expired, resubscribing");
                        break WatchSignal::Gone;
                    }
                    return Err(WatcherError::KubeApi(kube::Error::Api(response)));
                }
                Err(e) => {
                    if WatchSignal::from_error(&e) == WatchSignal::Gone {
                        info!(error = %e, "Watch cursor expired, resubscribing");
                        break WatchSignal::Gone;
                    }
                    return Err(e.into());
                }
            };

            self.handle_event(&event, started_at).await?;
        };

        *stream = None;
        Ok(signal)
    }

    /// Handle one cluster event observed by a subscription started at `started_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod read fails for a reason other than "not
    /// found", or if publishing fails.
    pub async fn handle_event(
        &self,
        event: &Event,
        started_at: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let reason = event.reason.as_deref().unwrap_or_default();
        let message = event.message.as_deref().unwrap_or_default();

        let Some(timestamp) = event_timestamp(event).filter(|t| *t >= started_at) else {
            debug!(reason, message, "Skipping event older than the subscription");
            return Ok(EventOutcome::Skipped(SkipReason::Stale));
        };

        let namespace = event.metadata.namespace.as_deref().unwrap_or_default();
        if !is_workspace_namespace(&self.config.namespace_prefix, namespace) {
            return Ok(EventOutcome::Skipped(SkipReason::NotWorkspace));
        }

        info!(
            namespace,
            %timestamp,
            event_type = event.type_.as_deref().unwrap_or_default(),
            reason,
            message,
            "Workspace event"
        );

        let involved = &event.involved_object;
        let pod_namespace = involved.namespace.as_deref().unwrap_or(namespace);
        let pod_name = involved.name.as_deref().unwrap_or_default();

        let pod = match self.pods.get_pod(pod_namespace, pod_name).await {
            Ok(Some(pod)) => pod,
            Ok(None) => {
                info!(namespace = pod_namespace, pod_name, "No such workspace pod");
                return Ok(EventOutcome::Skipped(SkipReason::PodGone));
            }
            Err(e) if is_not_found(&e) => {
                info!(namespace = pod_namespace, pod_name, "No such workspace pod");
                return Ok(EventOutcome::Skipped(SkipReason::PodGone));
            }
            Err(e) => return Err(e.into()),
        };

        let meta = pod.metadata.labels.as_ref().and_then(meta_from_labels);
        let (Some(meta), Some(container)) = (meta, workspace_container(&pod)) else {
            warn!(namespace = pod_namespace, pod_name, "Workspace pod lacks labels or containers");
            return Ok(EventOutcome::Skipped(SkipReason::MissingMetadata));
        };

        match routing_key_for(reason, message, container) {
            Some(routing_key) => {
                self.publisher
                    .publish(&DomainEvent::for_workspace(routing_key, &meta))
                    .await?;
                Ok(EventOutcome::Published(routing_key))
            }
            None => {
                log_container_statuses(&pod);
                Ok(EventOutcome::Skipped(SkipReason::NotLifecycle))
            }
        }
    }
}
