//! Allocation requests from the front end.
//!
//! The consumer is the only process holding the store open. The front end
//! publishes `workspace.launch.requested` and `workspace.allocation.deleted`
//! events instead, and the handlers apply them through this module.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use labspace_core::events::{ALLOCATION_FIELD, ASSIGNMENT_FIELD, INSTRUCTOR_FIELD, STUDENT_FIELD};
use labspace_core::{AllocationId, AssignmentId, EventFields, UserId};
use labspace_store::{Store, WorkspaceAllocation, WorkspaceSpec};

use crate::error::{ControlError, Result};

/// Field name of the container image.
pub const IMAGE_FIELD: &str = "image";
/// Field name of the baseline CPU count.
pub const CPUS_FIELD: &str = "cpus";
/// Field name of the baseline memory in GiB.
pub const MEMORY_FIELD: &str = "memory_gib";
/// Field name of the GPU count.
pub const GPUS_FIELD: &str = "gpus";
/// Field name of the storage size in GiB.
pub const STORAGE_FIELD: &str = "storage_gib";
/// Field name of the repository cloned on first start.
pub const CODE_REPO_FIELD: &str = "code_repo";
/// Field name of the init container debug flag.
pub const DEBUG_FIELD: &str = "debug";

/// A learner's request to launch a workspace.
///
/// Resource fields are optional; absent ones fall back to
/// [`WorkspaceSpec::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    /// Assignment reference.
    pub assignment_id: AssignmentId,
    /// Learner reference.
    pub learner_id: UserId,
    /// Instructor opening a review session, if any.
    pub instructor_id: Option<UserId>,
    /// Image and resources for a new allocation.
    pub spec: WorkspaceSpec,
    /// Run the init container in debug mode.
    pub debug: bool,
}

impl LaunchRequest {
    /// A request with the default workspace spec.
    #[must_use]
    pub fn new(assignment_id: AssignmentId, learner_id: UserId) -> Self {
        Self {
            assignment_id,
            learner_id,
            instructor_id: None,
            spec: WorkspaceSpec::default(),
            debug: false,
        }
    }

    /// The allocation this request resolves to.
    #[must_use]
    pub fn allocation_id(&self) -> AllocationId {
        AllocationId::derive(&self.assignment_id, &self.learner_id)
    }

    /// Parse a request from event fields.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidRequest` if the assignment or learner is
    /// missing, or if any present field fails to parse.
    pub fn from_fields(fields: &EventFields) -> Result<Self> {
        let mut request = Self::new(
            required(fields, ASSIGNMENT_FIELD)?,
            required(fields, STUDENT_FIELD)?,
        );
        request.instructor_id = optional(fields, INSTRUCTOR_FIELD)?;

        let spec = &mut request.spec;
        if let Some(image) = fields.get(IMAGE_FIELD) {
            spec.image.clone_from(image);
        }
        if let Some(cpus) = optional(fields, CPUS_FIELD)? {
            spec.cpus = cpus;
        }
        if let Some(memory) = optional(fields, MEMORY_FIELD)? {
            spec.memory_gib = memory;
        }
        if let Some(gpus) = optional(fields, GPUS_FIELD)? {
            spec.gpus = gpus;
        }
        if let Some(storage) = optional(fields, STORAGE_FIELD)? {
            spec.storage_gib = storage;
        }
        spec.code_repo = fields.get(CODE_REPO_FIELD).cloned();
        request.debug = optional(fields, DEBUG_FIELD)?.unwrap_or(false);

        Ok(request)
    }

    /// Encode the request as event fields.
    #[must_use]
    pub fn to_fields(&self) -> EventFields {
        let mut fields = EventFields::new();
        fields.insert(ASSIGNMENT_FIELD.to_string(), self.assignment_id.to_string());
        fields.insert(STUDENT_FIELD.to_string(), self.learner_id.to_string());
        if let Some(instructor) = self.instructor_id {
            fields.insert(INSTRUCTOR_FIELD.to_string(), instructor.to_string());
        }
        fields.insert(IMAGE_FIELD.to_string(), self.spec.image.clone());
        fields.insert(CPUS_FIELD.to_string(), self.spec.cpus.to_string());
        fields.insert(MEMORY_FIELD.to_string(), self.spec.memory_gib.to_string());
        fields.insert(GPUS_FIELD.to_string(), self.spec.gpus.to_string());
        fields.insert(STORAGE_FIELD.to_string(), self.spec.storage_gib.to_string());
        if let Some(repo) = &self.spec.code_repo {
            fields.insert(CODE_REPO_FIELD.to_string(), repo.clone());
        }
        fields.insert(DEBUG_FIELD.to_string(), self.debug.to_string());
        fields
    }
}

fn optional<T: FromStr>(fields: &EventFields, name: &str) -> Result<Option<T>> {
    fields
        .get(name)
        .map(|raw| {
            raw.parse()
                .map_err(|_| ControlError::InvalidRequest(format!("invalid {name}: {raw}")))
        })
        .transpose()
}

fn required<T: FromStr>(fields: &EventFields, name: &str) -> Result<T> {
    optional(fields, name)?.ok_or_else(|| ControlError::InvalidRequest(format!("missing {name}")))
}

/// The allocation referenced by a `workspace.allocation.deleted` event.
///
/// # Errors
///
/// Returns `ControlError::InvalidRequest` if the reference is missing or malformed.
pub fn allocation_reference(fields: &EventFields) -> Result<AllocationId> {
    let raw = fields
        .get(ALLOCATION_FIELD)
        .ok_or_else(|| ControlError::InvalidRequest(format!("missing {ALLOCATION_FIELD}")))?;
    AllocationId::from_hex(raw)
        .map_err(|_| ControlError::InvalidRequest(format!("invalid {ALLOCATION_FIELD}: {raw}")))
}

/// Return the allocation for the request, creating it on first use.
///
/// An existing allocation keeps its spec.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn register_allocation<S: Store + ?Sized>(
    store: &S,
    request: &LaunchRequest,
    now: DateTime<Utc>,
) -> Result<WorkspaceAllocation> {
    if let Some(existing) = store.get_allocation(&request.allocation_id())? {
        return Ok(existing);
    }

    let mut allocation = WorkspaceAllocation::new(
        request.assignment_id,
        request.learner_id,
        request.spec.clone(),
        now,
    );
    allocation.debug = request.debug;
    store.put_allocation(&allocation)?;
    tracing::info!(
        allocation_id = %allocation.allocation_id,
        assignment_id = %request.assignment_id,
        learner_id = %request.learner_id,
        "Registered workspace allocation"
    );
    Ok(allocation)
}

/// Delete an allocation and its sessions. Returns false if it did not exist.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn delete_allocation<S: Store + ?Sized>(store: &S, allocation_id: &AllocationId) -> Result<bool> {
    if store.get_allocation(allocation_id)?.is_none() {
        return Ok(false);
    }
    store.delete_allocation(allocation_id)?;
    tracing::info!(allocation_id = %allocation_id, "Deleted workspace allocation");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labspace_store::RocksStore;
    use tempfile::TempDir;

    fn store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (RocksStore::open(dir.path()).unwrap(), dir)
    }

    #[test]
    fn minimal_request_uses_default_spec() {
        let assignment = AssignmentId::generate();
        let learner = UserId::generate();
        let mut fields = EventFields::new();
        fields.insert(ASSIGNMENT_FIELD.to_string(), assignment.to_string());
        fields.insert(STUDENT_FIELD.to_string(), learner.to_string());

        let request = LaunchRequest::from_fields(&fields).unwrap();

        assert_eq!(request, LaunchRequest::new(assignment, learner));
        assert_eq!(request.allocation_id(), AllocationId::derive(&assignment, &learner));
    }

    #[test]
    fn resource_fields_override_the_spec() {
        let mut request = LaunchRequest::new(AssignmentId::generate(), UserId::generate());
        request.instructor_id = Some(UserId::generate());
        request.spec.gpus = 1;
        request.spec.memory_gib = 8.0;
        request.spec.code_repo = Some("https://example.com/course/lab.git".to_string());
        request.debug = true;

        assert_eq!(LaunchRequest::from_fields(&request.to_fields()).unwrap(), request);
    }

    #[test]
    fn missing_or_invalid_fields_are_rejected() {
        let request = LaunchRequest::new(AssignmentId::generate(), UserId::generate());

        let mut missing = request.to_fields();
        missing.remove(STUDENT_FIELD);
        assert!(matches!(
            LaunchRequest::from_fields(&missing),
            Err(ControlError::InvalidRequest(_))
        ));

        let mut invalid = request.to_fields();
        invalid.insert(CPUS_FIELD.to_string(), "lots".to_string());
        assert!(matches!(
            LaunchRequest::from_fields(&invalid),
            Err(ControlError::InvalidRequest(_))
        ));
    }

    #[test]
    fn register_is_idempotent_per_pair() {
        let (store, _dir) = store();
        let request = LaunchRequest::new(AssignmentId::generate(), UserId::generate());

        let first = register_allocation(&store, &request, Utc::now()).unwrap();
        let mut bigger = request.clone();
        bigger.spec.cpus = 4.0;
        let second = register_allocation(&store, &bigger, Utc::now()).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.spec.cpus, request.spec.cpus);
    }

    #[test]
    fn delete_reports_missing_allocations() {
        let (store, _dir) = store();
        let request = LaunchRequest::new(AssignmentId::generate(), UserId::generate());
        let allocation = register_allocation(&store, &request, Utc::now()).unwrap();

        assert!(delete_allocation(&store, &allocation.allocation_id).unwrap());
        assert!(!delete_allocation(&store, &allocation.allocation_id).unwrap());
        assert!(store.get_allocation(&allocation.allocation_id).unwrap().is_none());
    }

    #[test]
    fn allocation_reference_must_be_hex() {
        let mut fields = EventFields::new();
        assert!(allocation_reference(&fields).is_err());

        fields.insert(ALLOCATION_FIELD.to_string(), "not-hex".to_string());
        assert!(allocation_reference(&fields).is_err());

        let id = AllocationId::from_bytes([3; 16]);
        fields.insert(ALLOCATION_FIELD.to_string(), id.to_hex());
        assert_eq!(allocation_reference(&fields).unwrap(), id);
    }
}
