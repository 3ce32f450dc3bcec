//! Error types for the provisioner crate.

use thiserror::Error;

/// Errors that can occur while provisioning workspaces.
#[derive(Error, Debug)]
pub enum ProvisionerError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// A manifest could not be serialized into an API object.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProvisionerError {
    /// Check if this error is retriable.
    ///
    /// API errors are retried except for rejected requests (4xx), which will
    /// keep failing with the same manifest.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::KubeApi(kube::Error::Api(response)) => {
                response.code >= 500 || response.code == 429 || response.code == 409
            }
            Self::KubeApi(_) => true,
            Self::InvalidManifest(_) | Self::Config(_) => false,
        }
    }
}

/// A specialized Result type for provisioner operations.
pub type Result<T> = std::result::Result<T, ProvisionerError>;

/// Whether an API error means the object does not exist.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(r) if r.code == 404 || r.reason == "NotFound")
}

/// Whether an API error means the object already exists.
#[must_use]
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(r) if r.reason == "AlreadyExists")
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} for test"),
        reason: reason.to_string(),
        code,
    })
}
