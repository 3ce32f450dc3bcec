//! Error types for the control layer.
//!
//! Domain no-ops (missing allocation, missing active session) are not errors
//! here: task handlers log them and succeed. Errors are infrastructure
//! failures, classified by [`ControlError::is_retriable`] for the task queue.

use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] labspace_store::StoreError),

    /// Cluster provisioning error.
    #[error("provisioner error: {0}")]
    Provisioner(#[from] labspace_provisioner::ProvisionerError),

    /// Broker error.
    #[error("broker error: {0}")]
    Broker(#[from] labspace_broker::BrokerError),

    /// A front-end request is missing a field or carries an invalid value.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The task queue has shut down.
    #[error("task queue closed")]
    QueueClosed,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::Provisioner(e) => e.is_retriable(),
            Self::Broker(e) => e.is_retriable(),
            Self::Internal(_) => true,
            Self::InvalidRequest(_) | Self::QueueClosed => false,
        }
    }
}
