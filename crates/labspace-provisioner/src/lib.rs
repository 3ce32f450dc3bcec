//! Kubernetes resource provisioner for labspace workspaces.
//!
//! A workspace is a namespace holding a secret, a deployment, a service, two
//! Traefik middlewares and an ingress route. This crate builds those objects
//! and applies them idempotently:
//!
//! - Every object is named from the allocation ID, so re-applying finds the
//!   existing objects instead of duplicating them
//! - "Already exists" on create is success; "not found" on scale or delete is
//!   logged and reported, not raised
//! - Teardown deletes the namespace, optionally waiting until it is gone
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use labspace_core::{AssignmentId, UserId};
//! use labspace_provisioner::{K8sProvisioner, Provisioner, ProvisionerConfig};
//! use labspace_store::{WorkspaceAllocation, WorkspaceSpec};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = K8sProvisioner::new(ProvisionerConfig::from_env()).await?;
//!
//! let allocation = WorkspaceAllocation::new(
//!     AssignmentId::generate(),
//!     UserId::generate(),
//!     WorkspaceSpec::default(),
//!     Utc::now(),
//! );
//! let set = provisioner.apply(&allocation).await?;
//! println!("{} objects created in {}", set.created_count(), set.namespace);
//!
//! provisioner.scale(&allocation.allocation_id, 0).await?;
//! provisioner.delete(&allocation.allocation_id, true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature for [`MockProvisioner`], which keeps
//! resource sets in memory and records every call.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod k8s;
pub mod readiness;
pub mod resources;
pub mod types;

pub use error::{is_already_exists, is_not_found, ProvisionerError, Result};
pub use k8s::{status_from_pod, tolerate_already_exists, K8sProvisioner, Provisioner};
pub use readiness::refresh_status;
pub use resources::{Manifest, ManifestContext, WorkspaceResource};
pub use types::{
    AppliedResource, ApplyOutcome, DeleteOutcome, ProvisionerConfig, ResourceKind, ResourceSet,
    ScaleOutcome,
};

#[cfg(any(test, feature = "test-utils"))]
pub use k8s::mock::{MockProvisioner, ProvisionerCall};
