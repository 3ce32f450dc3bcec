//! Supervisor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the idle-health supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How long a pod must have been ready before it is polled.
    pub readiness_grace: Duration,
    /// Inactivity after which a workspace is reported idle.
    pub idle_threshold: Duration,
    /// Maximum liveness requests in flight.
    pub concurrency: usize,
    /// Timeout of one liveness request.
    pub request_timeout: Duration,
    /// Label selector of workspace pods.
    pub pod_selector: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            readiness_grace: Duration::from_secs(3 * 60),
            idle_threshold: Duration::from_secs(5 * 60),
            concurrency: 50,
            request_timeout: Duration::from_secs(10),
            pod_selector: "pod=workspace".to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `SUPERVISOR_READINESS_GRACE_SECS` (default: 180)
    /// - `SUPERVISOR_IDLE_THRESHOLD_SECS` (default: 300)
    /// - `SUPERVISOR_CONCURRENCY` (default: 50)
    /// - `SUPERVISOR_REQUEST_TIMEOUT_SECS` (default: 10)
    /// - `SUPERVISOR_POD_SELECTOR` (default: `pod=workspace`)
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SUPERVISOR_READINESS_GRACE_SECS") {
            if let Ok(n) = val.parse() {
                config.readiness_grace = Duration::from_secs(n);
            }
        }
        if let Ok(val) = std::env::var("SUPERVISOR_IDLE_THRESHOLD_SECS") {
            if let Ok(n) = val.parse() {
                config.idle_threshold = Duration::from_secs(n);
            }
        }
        if let Ok(val) = std::env::var("SUPERVISOR_CONCURRENCY") {
            if let Ok(n) = val.parse::<usize>() {
                config.concurrency = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("SUPERVISOR_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.request_timeout = Duration::from_secs(n);
            }
        }
        if let Ok(val) = std::env::var("SUPERVISOR_POD_SELECTOR") {
            config.pod_selector = val;
        }

        config
    }
}
