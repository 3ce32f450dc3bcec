//! Error types for the supervisor crate.

use thiserror::Error;

/// Errors that can occur during an activity check.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// Liveness request failed or returned a non-success status.
    #[error("Liveness request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Publishing an activity event failed.
    #[error("Broker error: {0}")]
    Broker(#[from] labspace_broker::BrokerError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A specialized Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
