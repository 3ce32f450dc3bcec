//! Control configuration.

use std::time::Duration;

/// Session timing rules.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Expiry added by a launch or an alive signal.
    pub extension_period: chrono::Duration,
    /// Hard ceiling on a started session, independent of the rolling expiry.
    pub max_duration: chrono::Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            extension_period: chrono::Duration::hours(1),
            max_duration: chrono::Duration::hours(6),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables (hours):
    /// - `WORKSPACES_SESSION_EXTENSION_PERIOD` (default: 1)
    /// - `WORKSPACES_MAX_SESSION_DURATION` (default: 6)
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WORKSPACES_SESSION_EXTENSION_PERIOD") {
            if let Ok(n) = val.parse() {
                config.extension_period = chrono::Duration::hours(n);
            }
        }
        if let Ok(val) = std::env::var("WORKSPACES_MAX_SESSION_DURATION") {
            if let Ok(n) = val.parse() {
                config.max_duration = chrono::Duration::hours(n);
            }
        }

        config
    }
}

/// Configuration for the consumer process.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Session timing rules.
    pub session: SessionConfig,
    /// Maximum tasks executing at once.
    pub workers: usize,
    /// Retries of a task failing with a retriable error.
    pub max_retries: u32,
    /// Base delay between retries, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Run the periodic session sweeps in this process.
    pub enable_sweeps: bool,
    /// Interval of the expired-session sweep.
    pub expired_sweep_interval: Duration,
    /// Interval of the max-duration sweep.
    pub max_duration_sweep_interval: Duration,
    /// Block for pod readiness after launching a workspace.
    pub launch_waits_for_readiness: bool,
    /// Directory of the `RocksDB` store.
    pub data_dir: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            workers: 8,
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            enable_sweeps: true,
            expired_sweep_interval: Duration::from_secs(60 * 60),
            max_duration_sweep_interval: Duration::from_secs(20 * 60),
            launch_waits_for_readiness: false,
            data_dir: "/data".to_string(),
        }
    }
}

impl ControlConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `WORKSPACES_SESSION_EXTENSION_PERIOD`, `WORKSPACES_MAX_SESSION_DURATION`
    /// - `TASK_WORKERS` (default: 8)
    /// - `TASK_MAX_RETRIES` (default: 3)
    /// - `TASK_RETRY_BACKOFF_MS` (default: 2000)
    /// - `ENABLE_PERIODIC_SWEEPS` (default: true)
    /// - `EXPIRED_SWEEP_INTERVAL_SECS` (default: 3600)
    /// - `MAX_DURATION_SWEEP_INTERVAL_SECS` (default: 1200)
    /// - `LAUNCH_WAITS_FOR_READINESS` (default: false)
    /// - `DATA_DIR` (default: `/data`)
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            session: SessionConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("TASK_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                config.workers = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("TASK_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                config.max_retries = n;
            }
        }
        if let Ok(val) = std::env::var("TASK_RETRY_BACKOFF_MS") {
            if let Ok(n) = val.parse() {
                config.retry_backoff = Duration::from_millis(n);
            }
        }
        if let Ok(val) = std::env::var("ENABLE_PERIODIC_SWEEPS") {
            config.enable_sweeps = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("EXPIRED_SWEEP_INTERVAL_SECS") {
            if let Ok(n) = val.parse() {
                config.expired_sweep_interval = Duration::from_secs(n);
            }
        }
        if let Ok(val) = std::env::var("MAX_DURATION_SWEEP_INTERVAL_SECS") {
            if let Ok(n) = val.parse() {
                config.max_duration_sweep_interval = Duration::from_secs(n);
            }
        }
        if let Ok(val) = std::env::var("LAUNCH_WAITS_FOR_READINESS") {
            config.launch_waits_for_readiness = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("DATA_DIR") {
            config.data_dir = val;
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.session.extension_period, chrono::Duration::hours(1));
        assert_eq!(config.session.max_duration, chrono::Duration::hours(6));
        assert_eq!(config.expired_sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.max_duration_sweep_interval, Duration::from_secs(1200));
    }

    #[test]
    fn flags() {
        assert!(parse_flag("True"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
