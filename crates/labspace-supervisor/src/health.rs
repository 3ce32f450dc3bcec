//! Liveness reports and the idle rule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Pod, Service};
use serde::{Deserialize, Serialize};

/// Body returned by a workspace's `/healthz/` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `alive` while the editor sees activity, `expired` otherwise.
    pub status: String,
    /// Epoch milliseconds of the last activity inside the workspace.
    #[serde(rename = "lastHeartbeat", default)]
    pub last_heartbeat: i64,
}

/// Verdict for one workspace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activity {
    /// The workspace reports itself alive.
    Alive,
    /// Inactive for at least the idle threshold.
    Idle {
        /// Minutes since the last heartbeat.
        idle_minutes: f64,
    },
    /// Inactive, but not long enough to act on.
    Quiet {
        /// Minutes since the last heartbeat.
        idle_minutes: f64,
    },
}

/// Apply the idle rule to a report.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(report: &HealthReport, now: DateTime<Utc>, threshold: Duration) -> Activity {
    if report.status == "alive" {
        return Activity::Alive;
    }
    let idle_ms = (now.timestamp_millis() - report.last_heartbeat).max(0);
    let idle_minutes = idle_ms as f64 / 60_000.0;
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    if idle_ms >= threshold_ms {
        Activity::Idle { idle_minutes }
    } else {
        Activity::Quiet { idle_minutes }
    }
}

/// Whether the pod's workspace container is ready and has been for at least `grace`.
#[must_use]
pub fn ready_long_enough(pod: &Pod, now: DateTime<Utc>, grace: Duration) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    let container_ready = status
        .container_statuses
        .as_ref()
        .and_then(|cs| cs.first())
        .is_some_and(|c| c.ready);
    if !container_ready {
        return false;
    }
    let Ok(grace) = chrono::Duration::from_std(grace) else {
        return false;
    };

    status
        .conditions
        .as_ref()
        .into_iter()
        .flatten()
        .filter(|c| c.type_ == "Ready")
        .filter_map(|c| c.last_transition_time.as_ref())
        .any(|since| now - since.0 >= grace)
}

/// In-cluster liveness URL of a workspace service.
#[must_use]
pub fn healthz_url(service: &Service) -> Option<String> {
    let name = service.metadata.name.as_deref()?;
    let namespace = service.metadata.namespace.as_deref()?;
    let port = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|p| p.first())?
        .port;
    Some(format!("http://{name}.{namespace}:{port}/healthz/"))
}
