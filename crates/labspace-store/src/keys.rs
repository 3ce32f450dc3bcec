//! Key encoding for the `RocksDB` column families.
//!
//! Index keys are concatenations of fixed-width IDs so they support prefix scans.

use labspace_core::{AllocationId, SessionId};

const ID_LEN: usize = 16;

/// Encode an allocation key.
#[must_use]
pub fn allocation_key(allocation_id: &AllocationId) -> Vec<u8> {
    allocation_id.as_bytes().to_vec()
}

/// Encode a status index key: `status || allocation_id`.
#[must_use]
pub fn status_allocation_key(status: u8, allocation_id: &AllocationId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + ID_LEN);
    key.push(status);
    key.extend_from_slice(allocation_id.as_bytes());
    key
}

/// Encode a status prefix for scanning allocations by cluster status.
#[must_use]
pub fn status_prefix(status: u8) -> Vec<u8> {
    vec![status]
}

/// Extract the allocation ID from a status index key.
#[must_use]
pub fn extract_allocation_id_from_status_key(key: &[u8]) -> Option<AllocationId> {
    let bytes: [u8; ID_LEN] = key.get(1..=ID_LEN)?.try_into().ok()?;
    Some(AllocationId::from_bytes(bytes))
}

/// Encode a session key.
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Decode a session key.
#[must_use]
pub fn extract_session_id(key: &[u8]) -> Option<SessionId> {
    let bytes: [u8; ID_LEN] = key.try_into().ok()?;
    Some(SessionId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Encode an allocation-session index key: `allocation_id || session_id`.
#[must_use]
pub fn allocation_session_key(allocation_id: &AllocationId, session_id: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(allocation_id.as_bytes());
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Encode an allocation prefix for scanning sessions by allocation.
#[must_use]
pub fn allocation_prefix(allocation_id: &AllocationId) -> Vec<u8> {
    allocation_id.as_bytes().to_vec()
}

/// Extract the session ID from an allocation-session key.
#[must_use]
pub fn extract_session_id_from_allocation_key(key: &[u8]) -> Option<SessionId> {
    extract_session_id(key.get(ID_LEN..2 * ID_LEN)?)
}
