//! Error types for the watcher crate.

use thiserror::Error;

/// Errors that stop the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Kubernetes API error other than an expired watch.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// Publishing a domain event failed.
    #[error("Broker error: {0}")]
    Broker(#[from] labspace_broker::BrokerError),

    /// The watcher already failed and will not resubscribe.
    #[error("watcher stopped after an unrecoverable error")]
    Stopped,
}

/// A specialized Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Whether an error response means the watch cursor expired (HTTP 410).
#[must_use]
pub fn is_gone_response(response: &kube::core::ErrorResponse) -> bool {
    response.code == 410 || response.reason == "Expired" || response.reason == "Gone"
}

/// Whether an API error means the watch cursor expired.
#[must_use]
pub fn is_gone(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(r) if is_gone_response(r))
}

/// Whether an API error means the object does not exist.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(r) if r.code == 404 || r.reason == "NotFound")
}

#[cfg(test)]
pub(crate) fn api_response(code: u16, reason: &str) -> kube::core::ErrorResponse {
    kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} for test"),
        reason: reason.to_string(),
        code,
    }
}
