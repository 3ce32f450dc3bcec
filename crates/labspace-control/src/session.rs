//! Session operations over the store.
//!
//! Task handlers never address a session by ID: events can be stale, so each
//! operation re-queries the allocation's current active session. A missing
//! active session is reported as `None`, not as an error.

use chrono::{DateTime, Utc};
use labspace_core::{AllocationId, SessionId, UserId};
use labspace_store::{Store, WorkspaceSession};

use crate::config::SessionConfig;
use crate::error::Result;

/// The allocation's active session, preferring the latest created one.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn active_session<S: Store + ?Sized>(
    store: &S,
    allocation_id: &AllocationId,
    now: DateTime<Utc>,
) -> Result<Option<WorkspaceSession>> {
    let sessions = store.list_sessions_by_allocation(allocation_id)?;
    Ok(sessions
        .into_iter()
        .filter(|s| s.is_active(now))
        .max_by_key(|s| s.created_at))
}

/// Create a session unless the allocation already has an active one.
///
/// Returns the active session and whether it was created by this call.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn create_session_if_none<S: Store + ?Sized>(
    store: &S,
    allocation_id: &AllocationId,
    instructor_id: Option<UserId>,
    now: DateTime<Utc>,
    config: &SessionConfig,
) -> Result<(WorkspaceSession, bool)> {
    if let Some(existing) = active_session(store, allocation_id, now)? {
        return Ok((existing, false));
    }

    let session = WorkspaceSession::new(*allocation_id, instructor_id, now, config.extension_period);
    store.put_session(&session)?;

    tracing::info!(
        allocation_id = %allocation_id,
        session_id = %session.session_id,
        expires_at = %session.expires_at,
        "Created session"
    );
    Ok((session, true))
}

/// Apply `transition` to the active session and persist it if it changed.
fn update_active<S, F>(
    store: &S,
    allocation_id: &AllocationId,
    now: DateTime<Utc>,
    transition: F,
) -> Result<Option<WorkspaceSession>>
where
    S: Store + ?Sized,
    F: FnOnce(&mut WorkspaceSession) -> bool,
{
    let Some(mut session) = active_session(store, allocation_id, now)? else {
        return Ok(None);
    };
    if transition(&mut session) {
        store.put_session(&session)?;
    }
    Ok(Some(session))
}

/// Mark the active session started.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn start<S: Store + ?Sized>(
    store: &S,
    allocation_id: &AllocationId,
    now: DateTime<Utc>,
) -> Result<Option<WorkspaceSession>> {
    update_active(store, allocation_id, now, |s| s.start(now))
}

/// Push the active session's expiry one extension period past `now`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn extend<S: Store + ?Sized>(
    store: &S,
    allocation_id: &AllocationId,
    now: DateTime<Utc>,
    config: &SessionConfig,
) -> Result<Option<WorkspaceSession>> {
    update_active(store, allocation_id, now, |s| s.extend(now, config.extension_period))
}

/// Expire the active session immediately.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn expire<S: Store + ?Sized>(
    store: &S,
    allocation_id: &AllocationId,
    now: DateTime<Utc>,
) -> Result<Option<WorkspaceSession>> {
    update_active(store, allocation_id, now, |s| s.expire(now))
}

/// Terminate a session and clear its allocation's cluster status.
///
/// Returns `None` if the session no longer exists. Terminating an already
/// terminated session leaves the record unchanged.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn terminate<S: Store + ?Sized>(
    store: &S,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Option<WorkspaceSession>> {
    let Some(mut session) = store.get_session(session_id)? else {
        return Ok(None);
    };
    if session.terminate(now) {
        store.put_session(&session)?;
    }

    if store.get_allocation(&session.allocation_id)?.is_some() {
        store.update_allocation_status(&session.allocation_id, None, now)?;
    }

    tracing::info!(
        allocation_id = %session.allocation_id,
        session_id = %session_id,
        "Terminated session"
    );
    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use labspace_core::AssignmentId;
    use labspace_store::{ClusterStatus, RocksStore, SessionStatus, WorkspaceAllocation, WorkspaceSpec};
    use tempfile::TempDir;

    fn setup() -> (RocksStore, TempDir, WorkspaceAllocation) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let allocation = WorkspaceAllocation::new(
            AssignmentId::generate(),
            UserId::generate(),
            WorkspaceSpec::default(),
            Utc::now(),
        );
        store.put_allocation(&allocation).unwrap();
        (store, dir, allocation)
    }

    #[test]
    fn at_most_one_active_session() {
        let (store, _dir, alloc) = setup();
        let config = SessionConfig::default();
        let now = Utc::now();

        let (first, created) =
            create_session_if_none(&store, &alloc.allocation_id, None, now, &config).unwrap();
        assert!(created);
        let (second, created) =
            create_session_if_none(&store, &alloc.allocation_id, None, now, &config).unwrap();
        assert!(!created);
        assert_eq!(first.session_id, second.session_id);

        let active: Vec<_> = store
            .list_sessions_by_allocation(&alloc.allocation_id)
            .unwrap()
            .into_iter()
            .filter(|s| s.is_active(now))
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn new_session_after_expiry() {
        let (store, _dir, alloc) = setup();
        let config = SessionConfig::default();
        let now = Utc::now();

        let (first, _) =
            create_session_if_none(&store, &alloc.allocation_id, None, now, &config).unwrap();
        expire(&store, &alloc.allocation_id, now).unwrap();

        let later = now + Duration::seconds(1);
        let (second, created) =
            create_session_if_none(&store, &alloc.allocation_id, None, later, &config).unwrap();
        assert!(created);
        assert_ne!(first.session_id, second.session_id);
    }

    #[test]
    fn latest_active_session_wins() {
        let (store, _dir, alloc) = setup();
        let now = Utc::now();
        let older = WorkspaceSession::new(alloc.allocation_id, None, now, Duration::hours(1));
        let newer = WorkspaceSession::new(
            alloc.allocation_id,
            None,
            now + Duration::seconds(5),
            Duration::hours(1),
        );
        store.put_session(&older).unwrap();
        store.put_session(&newer).unwrap();

        let active = active_session(&store, &alloc.allocation_id, now + Duration::seconds(10))
            .unwrap()
            .unwrap();
        assert_eq!(active.session_id, newer.session_id);
    }

    #[test]
    fn transitions_without_session_are_no_ops() {
        let (store, _dir, alloc) = setup();
        let now = Utc::now();
        let config = SessionConfig::default();

        assert!(start(&store, &alloc.allocation_id, now).unwrap().is_none());
        assert!(extend(&store, &alloc.allocation_id, now, &config).unwrap().is_none());
        assert!(expire(&store, &alloc.allocation_id, now).unwrap().is_none());
    }

    #[test]
    fn start_then_extend_persists() {
        let (store, _dir, alloc) = setup();
        let config = SessionConfig::default();
        let now = Utc::now();
        create_session_if_none(&store, &alloc.allocation_id, None, now, &config).unwrap();

        let started = start(&store, &alloc.allocation_id, now).unwrap().unwrap();
        assert_eq!(started.status(now), SessionStatus::Started);

        let later = now + Duration::minutes(30);
        let extended = extend(&store, &alloc.allocation_id, later, &config).unwrap().unwrap();
        assert_eq!(extended.expires_at, later + config.extension_period);

        let stored = store.get_session(&extended.session_id).unwrap().unwrap();
        assert_eq!(stored.expires_at, extended.expires_at);
        assert_eq!(stored.started_at, Some(now));
    }

    #[test]
    fn terminate_clears_cluster_status() {
        let (store, _dir, alloc) = setup();
        let config = SessionConfig::default();
        let now = Utc::now();
        store
            .update_allocation_status(&alloc.allocation_id, Some(ClusterStatus::Running), now)
            .unwrap();
        let (session, _) =
            create_session_if_none(&store, &alloc.allocation_id, None, now, &config).unwrap();
        expire(&store, &alloc.allocation_id, now).unwrap();

        let ended = terminate(&store, &session.session_id, now).unwrap().unwrap();
        assert!(ended.terminated);

        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(stored.status(now), SessionStatus::Ended);
        assert_eq!(stored.ended_at, Some(now));
        let allocation = store.get_allocation(&alloc.allocation_id).unwrap().unwrap();
        assert_eq!(allocation.cluster_status, None);

        // Repeating keeps the first end time.
        let later = now + Duration::minutes(1);
        let again = terminate(&store, &session.session_id, later).unwrap().unwrap();
        assert_eq!(again.ended_at, Some(now));
    }

    #[test]
    fn terminate_missing_session() {
        let (store, _dir, _alloc) = setup();
        assert!(terminate(&store, &SessionId::generate(), Utc::now()).unwrap().is_none());
    }
}
