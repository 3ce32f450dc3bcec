//! Workspace readiness polling.

use std::time::Duration;

use tracing::{debug, warn};

use labspace_core::AllocationId;
use labspace_store::ClusterStatus;

use crate::k8s::Provisioner;
use crate::Result;

/// Read the workspace status, optionally waiting for the pod to become ready.
///
/// Without `wait` this is a single read. With `wait`, the status is re-read
/// while it is unknown or pending, sleeping `backoff × attempt` between reads.
/// After `retries` attempts without a settled status the workspace is
/// considered [`ClusterStatus::Failed`].
///
/// # Errors
///
/// Returns an error if a status read fails.
pub async fn refresh_status<P: Provisioner + ?Sized>(
    provisioner: &P,
    allocation_id: &AllocationId,
    wait: bool,
    retries: u32,
    backoff: Duration,
) -> Result<Option<ClusterStatus>> {
    let mut status = provisioner.workspace_status(allocation_id).await?;
    if !wait {
        return Ok(status);
    }

    let mut attempt = 0;
    while matches!(status, None | Some(ClusterStatus::Pending)) {
        if attempt >= retries {
            warn!(allocation_id = %allocation_id, retries, "Workspace never became ready");
            return Ok(Some(ClusterStatus::Failed));
        }
        attempt += 1;
        debug!(allocation_id = %allocation_id, attempt, ?status, "Workspace not ready yet");
        tokio::time::sleep(backoff * attempt).await;
        status = provisioner.workspace_status(allocation_id).await?;
    }

    Ok(status)
}
