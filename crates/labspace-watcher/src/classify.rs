//! Mapping cluster events to workspace lifecycle events.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, Pod};
use tracing::info;

use labspace_core::routing;

/// Time the event was observed: event time, else last seen, else first seen.
#[must_use]
pub fn event_timestamp(event: &Event) -> Option<DateTime<Utc>> {
    event
        .event_time
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.last_timestamp.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
}

/// Name of the workspace container: the first container of the pod.
#[must_use]
pub fn workspace_container(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .map(|c| c.name.as_str())
}

/// Routing key for an event reason, if the reason is a lifecycle transition.
///
/// Transitions that name a container only count when they name the
/// workspace container, not the init container.
#[must_use]
pub fn routing_key_for(reason: &str, message: &str, container: &str) -> Option<&'static str> {
    let mentions_workspace = message.contains(container);
    match reason.to_ascii_uppercase().as_str() {
        "SCHEDULED" if mentions_workspace => Some(routing::WORKSPACE_SCHEDULED),
        "CREATED" if mentions_workspace => Some(routing::WORKSPACE_CREATED),
        "STARTED" if mentions_workspace => Some(routing::WORKSPACE_STARTED),
        "FAILED" | "BACKOFF" => Some(routing::WORKSPACE_FAILED),
        "KILLING" if mentions_workspace => Some(routing::WORKSPACE_DELETED),
        _ => None,
    }
}

/// Log the first container and init container status of a pod that is not
/// at a lifecycle transition.
pub fn log_container_statuses(pod: &Pod) {
    let pod_name = pod.metadata.name.as_deref().unwrap_or("unknown");
    let status = pod.status.as_ref();

    for (kind, statuses) in [
        ("container", status.and_then(|s| s.container_statuses.as_ref())),
        ("init_container", status.and_then(|s| s.init_container_statuses.as_ref())),
    ] {
        match statuses.and_then(|s| s.first()) {
            Some(cs) => info!(
                pod_name,
                kind,
                container = %cs.name,
                ready = cs.ready,
                state = ?cs.state,
                "Container status"
            ),
            None => info!(pod_name, kind, "Pod has not been scheduled onto a node yet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, Time};

    #[test]
    fn timestamp_prefers_event_time() {
        let now = Utc::now();
        let earlier = now - Duration::minutes(5);
        let mut event = Event {
            first_timestamp: Some(Time(earlier)),
            ..Default::default()
        };
        assert_eq!(event_timestamp(&event), Some(earlier));

        event.last_timestamp = Some(Time(now));
        assert_eq!(event_timestamp(&event), Some(now));

        let latest = now + Duration::seconds(1);
        event.event_time = Some(MicroTime(latest));
        assert_eq!(event_timestamp(&event), Some(latest));

        assert_eq!(event_timestamp(&Event::default()), None);
    }

    #[test]
    fn started_requires_workspace_container() {
        let container = "wa-0123";
        assert_eq!(
            routing_key_for("Started", "Started container wa-0123", container),
            Some(routing::WORKSPACE_STARTED)
        );
        assert_eq!(
            routing_key_for("Started", "Started container init-workspace", container),
            None
        );
    }

    #[test]
    fn failures_do_not_require_container() {
        assert_eq!(
            routing_key_for("BackOff", "Back-off pulling image", "wa-0123"),
            Some(routing::WORKSPACE_FAILED)
        );
        assert_eq!(
            routing_key_for("Failed", "Error: ErrImagePull", "wa-0123"),
            Some(routing::WORKSPACE_FAILED)
        );
    }

    #[test]
    fn other_reasons_are_not_published() {
        assert_eq!(routing_key_for("Pulled", "Pulled wa-0123", "wa-0123"), None);
        assert_eq!(
            routing_key_for("Killing", "Stopping container wa-0123", "wa-0123"),
            Some(routing::WORKSPACE_DELETED)
        );
    }
}
