//! `RocksDB` implementation of [`Store`].

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use labspace_core::{AllocationId, SessionId};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::session::WorkspaceSession;
use crate::types::{ClusterStatus, WorkspaceAllocation};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collect the keys of `cf_name` that start with `prefix`.
    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let handle = self.cf(cf_name)?;
        let mut found = Vec::new();
        for item in self
            .db
            .iterator_cf(&handle, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            found.push(key);
        }
        Ok(found)
    }

    fn sessions_from_ids(
        &self,
        ids: impl IntoIterator<Item = SessionId>,
    ) -> Result<Vec<WorkspaceSession>> {
        let mut sessions = Vec::new();
        for id in ids {
            if let Some(session) = self.get_session(&id)? {
                sessions.push(session);
            }
        }
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Allocation Operations
    // =========================================================================

    fn put_allocation(&self, allocation: &WorkspaceAllocation) -> Result<()> {
        let cf_allocations = self.cf(cf::ALLOCATIONS)?;
        let cf_by_status = self.cf(cf::ALLOCATIONS_BY_STATUS)?;

        let key = keys::allocation_key(&allocation.allocation_id);
        let value = Self::serialize(allocation)?;

        let old_status = self
            .get_allocation(&allocation.allocation_id)?
            .and_then(|a| a.cluster_status);

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_allocations, &key, &value);

        if let Some(old) = old_status {
            if Some(old) != allocation.cluster_status {
                let old_key = keys::status_allocation_key(old.as_u8(), &allocation.allocation_id);
                batch.delete_cf(&cf_by_status, &old_key);
            }
        }
        if let Some(status) = allocation.cluster_status {
            let status_key = keys::status_allocation_key(status.as_u8(), &allocation.allocation_id);
            batch.put_cf(&cf_by_status, &status_key, []);
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn get_allocation(&self, allocation_id: &AllocationId) -> Result<Option<WorkspaceAllocation>> {
        let handle = self.cf(cf::ALLOCATIONS)?;
        self.db
            .get_cf(&handle, keys::allocation_key(allocation_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_allocation(&self, allocation_id: &AllocationId) -> Result<()> {
        let cf_allocations = self.cf(cf::ALLOCATIONS)?;
        let cf_by_status = self.cf(cf::ALLOCATIONS_BY_STATUS)?;
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_allocation = self.cf(cf::SESSIONS_BY_ALLOCATION)?;
        let cf_open = self.cf(cf::OPEN_SESSIONS)?;

        let allocation = self
            .get_allocation(allocation_id)?
            .ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_allocations, keys::allocation_key(allocation_id));
        if let Some(status) = allocation.cluster_status {
            batch.delete_cf(
                &cf_by_status,
                keys::status_allocation_key(status.as_u8(), allocation_id),
            );
        }

        for index_key in self.scan_prefix(cf::SESSIONS_BY_ALLOCATION, &keys::allocation_prefix(allocation_id))? {
            if let Some(session_id) = keys::extract_session_id_from_allocation_key(&index_key) {
                let session_key = keys::session_key(&session_id);
                batch.delete_cf(&cf_sessions, &session_key);
                batch.delete_cf(&cf_open, &session_key);
            }
            batch.delete_cf(&cf_by_allocation, &index_key);
        }

        self.db.write(batch)?;
        tracing::debug!(allocation_id = %allocation_id, "Deleted allocation and its sessions");
        Ok(())
    }

    fn list_allocations_by_status(
        &self,
        status: ClusterStatus,
    ) -> Result<Vec<WorkspaceAllocation>> {
        let mut allocations = Vec::new();
        for key in self.scan_prefix(cf::ALLOCATIONS_BY_STATUS, &keys::status_prefix(status.as_u8()))? {
            let Some(allocation_id) = keys::extract_allocation_id_from_status_key(&key) else {
                continue;
            };
            if let Some(allocation) = self.get_allocation(&allocation_id)? {
                allocations.push(allocation);
            }
        }
        Ok(allocations)
    }

    fn update_allocation_status(
        &self,
        allocation_id: &AllocationId,
        status: Option<ClusterStatus>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut allocation = self
            .get_allocation(allocation_id)?
            .ok_or(StoreError::NotFound)?;
        allocation.set_cluster_status(status, now);
        self.put_allocation(&allocation)
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    fn put_session(&self, session: &WorkspaceSession) -> Result<()> {
        let cf_sessions = self.cf(cf::SESSIONS)?;
        let cf_by_allocation = self.cf(cf::SESSIONS_BY_ALLOCATION)?;
        let cf_open = self.cf(cf::OPEN_SESSIONS)?;

        let session_key = keys::session_key(&session.session_id);
        let index_key = keys::allocation_session_key(&session.allocation_id, &session.session_id);
        let value = Self::serialize(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_sessions, &session_key, &value);
        batch.put_cf(&cf_by_allocation, &index_key, []);
        if session.terminated {
            batch.delete_cf(&cf_open, &session_key);
        } else {
            batch.put_cf(&cf_open, &session_key, []);
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<WorkspaceSession>> {
        let handle = self.cf(cf::SESSIONS)?;
        self.db
            .get_cf(&handle, keys::session_key(session_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_sessions_by_allocation(
        &self,
        allocation_id: &AllocationId,
    ) -> Result<Vec<WorkspaceSession>> {
        let index = self.scan_prefix(
            cf::SESSIONS_BY_ALLOCATION,
            &keys::allocation_prefix(allocation_id),
        )?;
        self.sessions_from_ids(
            index
                .iter()
                .filter_map(|key| keys::extract_session_id_from_allocation_key(key)),
        )
    }

    fn list_open_sessions(&self) -> Result<Vec<WorkspaceSession>> {
        let index = self.scan_prefix(cf::OPEN_SESSIONS, &[])?;
        self.sessions_from_ids(index.iter().filter_map(|key| keys::extract_session_id(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkspaceSpec;
    use chrono::Duration;
    use labspace_core::{AssignmentId, UserId};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_allocation() -> WorkspaceAllocation {
        WorkspaceAllocation::new(
            AssignmentId::generate(),
            UserId::generate(),
            WorkspaceSpec::default(),
            Utc::now(),
        )
    }

    #[test]
    fn allocation_crud() {
        let (store, _dir) = create_test_store();
        let allocation = create_test_allocation();

        store.put_allocation(&allocation).unwrap();
        let retrieved = store.get_allocation(&allocation.allocation_id).unwrap().unwrap();
        assert_eq!(retrieved, allocation);

        store.delete_allocation(&allocation.allocation_id).unwrap();
        assert!(store.get_allocation(&allocation.allocation_id).unwrap().is_none());
        assert!(matches!(
            store.delete_allocation(&allocation.allocation_id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn status_index_follows_updates() {
        let (store, _dir) = create_test_store();
        let allocation = create_test_allocation();
        store.put_allocation(&allocation).unwrap();

        let id = allocation.allocation_id;
        let now = Utc::now();
        assert!(store.list_allocations_by_status(ClusterStatus::Running).unwrap().is_empty());

        store.update_allocation_status(&id, Some(ClusterStatus::Pending), now).unwrap();
        store.update_allocation_status(&id, Some(ClusterStatus::Running), now).unwrap();
        assert!(store.list_allocations_by_status(ClusterStatus::Pending).unwrap().is_empty());
        assert_eq!(store.list_allocations_by_status(ClusterStatus::Running).unwrap().len(), 1);

        store.update_allocation_status(&id, None, now).unwrap();
        assert!(store.list_allocations_by_status(ClusterStatus::Running).unwrap().is_empty());
        let cleared = store.get_allocation(&id).unwrap().unwrap();
        assert_eq!(cleared.cluster_status, None);
        assert_eq!(cleared.status_updated_at, Some(now));
    }

    #[test]
    fn update_status_of_missing_allocation() {
        let (store, _dir) = create_test_store();
        let result = store.update_allocation_status(
            &AllocationId::from_bytes([0; 16]),
            Some(ClusterStatus::Running),
            Utc::now(),
        );
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn sessions_are_listed_by_allocation_oldest_first() {
        let (store, _dir) = create_test_store();
        let a = create_test_allocation();
        let b = create_test_allocation();
        store.put_allocation(&a).unwrap();
        store.put_allocation(&b).unwrap();

        let now = Utc::now();
        for offset in [2, 0, 1] {
            let created = now + Duration::minutes(offset);
            let session = WorkspaceSession::new(a.allocation_id, None, created, Duration::hours(1));
            store.put_session(&session).unwrap();
        }
        let other = WorkspaceSession::new(b.allocation_id, None, now, Duration::hours(1));
        store.put_session(&other).unwrap();

        let sessions = store.list_sessions_by_allocation(&a.allocation_id).unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(store.list_sessions_by_allocation(&b.allocation_id).unwrap().len(), 1);
    }

    #[test]
    fn open_index_drops_terminated_sessions() {
        let (store, _dir) = create_test_store();
        let allocation = create_test_allocation();
        store.put_allocation(&allocation).unwrap();

        let now = Utc::now();
        let mut session = WorkspaceSession::new(allocation.allocation_id, None, now, Duration::hours(1));
        store.put_session(&session).unwrap();
        assert_eq!(store.list_open_sessions().unwrap().len(), 1);

        session.terminate(now);
        store.put_session(&session).unwrap();
        assert!(store.list_open_sessions().unwrap().is_empty());

        let stored = store.get_session(&session.session_id).unwrap().unwrap();
        assert!(stored.terminated);
    }

    #[test]
    fn deleting_allocation_cascades_sessions() {
        let (store, _dir) = create_test_store();
        let allocation = create_test_allocation();
        store.put_allocation(&allocation).unwrap();

        let session =
            WorkspaceSession::new(allocation.allocation_id, None, Utc::now(), Duration::hours(1));
        store.put_session(&session).unwrap();

        store.delete_allocation(&allocation.allocation_id).unwrap();
        assert!(store.get_session(&session.session_id).unwrap().is_none());
        assert!(store.list_open_sessions().unwrap().is_empty());
        assert!(store
            .list_sessions_by_allocation(&allocation.allocation_id)
            .unwrap()
            .is_empty());
    }
}
