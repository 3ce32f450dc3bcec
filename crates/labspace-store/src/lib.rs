//! `RocksDB` storage for labspace.
//!
//! Persists workspace allocations and their sessions, with column families as
//! secondary indexes:
//!
//! - `allocations`: primary allocation records, keyed by `allocation_id`
//! - `allocations_by_status`: allocations by cluster status
//! - `sessions`: primary session records, keyed by `session_id`
//! - `sessions_by_allocation`: sessions of one allocation
//! - `open_sessions`: sessions that are not terminated yet
//!
//! The session state machine lives on [`WorkspaceSession`]; the store only
//! persists records and keeps the indexes consistent.
//!
//! # Example
//!
//! ```no_run
//! use labspace_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/labspace-db").unwrap();
//! let open = store.list_open_sessions().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod session;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use session::{SessionStatus, WorkspaceSession};
pub use types::{ClusterStatus, VolumeDescriptor, WorkspaceAllocation, WorkspaceSpec};

use chrono::{DateTime, Utc};
use labspace_core::{AllocationId, SessionId};

/// The storage trait for allocations and sessions.
pub trait Store: Send + Sync {
    // =========================================================================
    // Allocation Operations
    // =========================================================================

    /// Insert or update an allocation record, maintaining the status index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_allocation(&self, allocation: &WorkspaceAllocation) -> Result<()>;

    /// Get an allocation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_allocation(&self, allocation_id: &AllocationId) -> Result<Option<WorkspaceAllocation>>;

    /// Delete an allocation together with its sessions.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the allocation doesn't exist.
    fn delete_allocation(&self, allocation_id: &AllocationId) -> Result<()>;

    /// List allocations whose last observed cluster status is `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_allocations_by_status(&self, status: ClusterStatus)
        -> Result<Vec<WorkspaceAllocation>>;

    /// Record a cluster status observation for an allocation.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the allocation doesn't exist.
    fn update_allocation_status(
        &self,
        allocation_id: &AllocationId,
        status: Option<ClusterStatus>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert or update a session record, maintaining the allocation and open indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_session(&self, session: &WorkspaceSession) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<WorkspaceSession>>;

    /// List all sessions of an allocation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions_by_allocation(
        &self,
        allocation_id: &AllocationId,
    ) -> Result<Vec<WorkspaceSession>>;

    /// List every session that has not been terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_open_sessions(&self) -> Result<Vec<WorkspaceSession>>;
}
