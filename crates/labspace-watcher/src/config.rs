//! Watcher configuration.

use labspace_core::naming::DEFAULT_NAMESPACE_PREFIX;
use serde::{Deserialize, Serialize};

/// Namespaces whose events are never delivered to the watcher.
pub const DEFAULT_EXCLUDED_NAMESPACES: [&str; 6] = [
    "default",
    "test",
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "vcl-core",
];

/// Configuration for the cluster watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Prefix of workspace namespaces.
    pub namespace_prefix: String,
    /// Namespaces filtered out server-side.
    pub excluded_namespaces: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            excluded_namespaces: DEFAULT_EXCLUDED_NAMESPACES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `WORKSPACES_NAMESPACE_PREFIX`: workspace namespace prefix (default: `wa-`)
    /// - `WATCHER_EXCLUDED_NAMESPACES`: comma-separated namespaces to ignore
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WORKSPACES_NAMESPACE_PREFIX") {
            config.namespace_prefix = val;
        }
        if let Ok(val) = std::env::var("WATCHER_EXCLUDED_NAMESPACES") {
            config.excluded_namespaces = val
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        config
    }

    /// Field selector limiting the watch to pod events outside system namespaces.
    #[must_use]
    pub fn field_selector(&self) -> String {
        self.excluded_namespaces
            .iter()
            .map(|ns| format!("metadata.namespace!={ns}"))
            .chain(std::iter::once("involvedObject.kind=Pod".to_string()))
            .collect::<Vec<_>>()
            .join(",")
    }
}
