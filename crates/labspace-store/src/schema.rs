//! Column families used by the `RocksDB` store.

/// Column family names.
pub mod cf {
    /// Allocation records, keyed by `allocation_id`.
    pub const ALLOCATIONS: &str = "allocations";

    /// Index: allocations by cluster status, keyed by `status || allocation_id`.
    pub const ALLOCATIONS_BY_STATUS: &str = "allocations_by_status";

    /// Session records, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by allocation, keyed by `allocation_id || session_id`.
    pub const SESSIONS_BY_ALLOCATION: &str = "sessions_by_allocation";

    /// Index: sessions not yet terminated, keyed by `session_id`.
    pub const OPEN_SESSIONS: &str = "open_sessions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ALLOCATIONS,
        cf::ALLOCATIONS_BY_STATUS,
        cf::SESSIONS,
        cf::SESSIONS_BY_ALLOCATION,
        cf::OPEN_SESSIONS,
    ]
}
