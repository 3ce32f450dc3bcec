//! Core types and utilities for labspace.
//!
//! This crate provides the foundational types shared by the watcher, the
//! supervisor and the consumer:
//!
//! - **Identifiers**: allocation, assignment, user and session IDs
//! - **Domain events**: routing keys and the flat field map they carry
//! - **Naming**: deterministic names for a workspace's cluster objects
//!
//! # Example
//!
//! ```
//! use labspace_core::{AllocationId, AssignmentId, UserId, WorkspaceNames};
//!
//! let allocation = AllocationId::derive(&AssignmentId::generate(), &UserId::generate());
//! let names = WorkspaceNames::new("wa-", &allocation);
//! assert!(names.namespace.starts_with("wa-"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod events;
pub mod ids;
pub mod naming;

pub use error::{CoreError, Result};
pub use events::{routing, DomainEvent, EventFields, WorkspaceMeta};
pub use ids::{AllocationId, AssignmentId, IdError, SessionId, UserId};
pub use naming::WorkspaceNames;
