//! Domain events exchanged over the broker.
//!
//! An event is a dot-delimited routing key plus a flat map of string fields.
//! The body published to the broker is the JSON encoding of the field map.

use crate::ids::{AllocationId, AssignmentId, IdError, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field map carried by every domain event.
pub type EventFields = BTreeMap<String, String>;

/// Routing keys published by the watcher, the supervisor and the front end.
pub mod routing {
    /// Workspace pod was scheduled onto a node.
    pub const WORKSPACE_SCHEDULED: &str = "k8s.workspace.scheduled";
    /// Workspace container was created.
    pub const WORKSPACE_CREATED: &str = "k8s.workspace.created";
    /// Workspace container started.
    pub const WORKSPACE_STARTED: &str = "k8s.workspace.started";
    /// Workspace pod failed or is backing off.
    pub const WORKSPACE_FAILED: &str = "k8s.workspace.failed";
    /// Workspace container is being killed.
    pub const WORKSPACE_DELETED: &str = "k8s.workspace.deleted";
    /// Liveness endpoint reported recent activity.
    pub const STATUS_ALIVE: &str = "workspace.status.alive";
    /// Liveness endpoint reported no activity past the idle threshold.
    pub const STATUS_IDLE: &str = "workspace.status.idle";
    /// Front end asked for a learner's workspace to be launched.
    pub const LAUNCH_REQUESTED: &str = "workspace.launch.requested";
    /// Front end removed an allocation.
    pub const ALLOCATION_DELETED: &str = "workspace.allocation.deleted";
    /// Connectivity probe used by readiness checks.
    pub const TEST_CONNECTION: &str = "test.connection";
}

/// Field name of the assignment reference.
pub const ASSIGNMENT_FIELD: &str = "assignment_id";
/// Field name of the learner reference.
pub const STUDENT_FIELD: &str = "student_id";
/// Field name of the allocation reference.
pub const ALLOCATION_FIELD: &str = "workspace_allocation_id";
/// Field name of the reviewing instructor on launch requests.
pub const INSTRUCTOR_FIELD: &str = "instructor_id";

/// A routing-key-tagged fact published to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-delimited routing key.
    pub routing_key: String,
    /// Flat string fields.
    pub fields: EventFields,
}

impl DomainEvent {
    /// Create an event from a routing key and field map.
    #[must_use]
    pub fn new(routing_key: impl Into<String>, fields: EventFields) -> Self {
        Self {
            routing_key: routing_key.into(),
            fields,
        }
    }

    /// Create an event carrying a workspace's identifying fields.
    #[must_use]
    pub fn for_workspace(routing_key: impl Into<String>, meta: &WorkspaceMeta) -> Self {
        Self::new(routing_key, meta.to_fields())
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Identifying fields of one workspace, as carried in pod labels and events.
///
/// Values are kept as strings: they are copied verbatim from cluster labels and
/// only parsed by the consumer when it needs to resolve the allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    /// Assignment reference.
    pub assignment_id: String,
    /// Learner reference.
    pub student_id: String,
    /// Allocation reference.
    pub workspace_allocation_id: String,
}

impl WorkspaceMeta {
    /// Build the metadata for an allocation.
    #[must_use]
    pub fn new(allocation: &AllocationId, assignment: &AssignmentId, learner: &UserId) -> Self {
        Self {
            assignment_id: assignment.to_string(),
            student_id: learner.to_string(),
            workspace_allocation_id: allocation.to_hex(),
        }
    }

    /// Read the metadata from an event field map.
    ///
    /// Returns `None` if any of the three fields is absent. Extra fields are ignored.
    #[must_use]
    pub fn from_fields(fields: &EventFields) -> Option<Self> {
        Some(Self {
            assignment_id: fields.get(ASSIGNMENT_FIELD)?.clone(),
            student_id: fields.get(STUDENT_FIELD)?.clone(),
            workspace_allocation_id: fields.get(ALLOCATION_FIELD)?.clone(),
        })
    }

    /// Convert into an event field map.
    #[must_use]
    pub fn to_fields(&self) -> EventFields {
        let mut fields = EventFields::new();
        fields.insert(ASSIGNMENT_FIELD.to_string(), self.assignment_id.clone());
        fields.insert(STUDENT_FIELD.to_string(), self.student_id.clone());
        fields.insert(
            ALLOCATION_FIELD.to_string(),
            self.workspace_allocation_id.clone(),
        );
        fields
    }

    /// Parse the allocation reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is not a valid allocation ID.
    pub fn allocation_id(&self) -> Result<AllocationId, IdError> {
        AllocationId::from_hex(&self.workspace_allocation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> WorkspaceMeta {
        WorkspaceMeta::new(
            &AllocationId::from_bytes([7; 16]),
            &AssignmentId::from_uuid(uuid::Uuid::nil()),
            &UserId::from_uuid(uuid::Uuid::nil()),
        )
    }

    #[test]
    fn event_body_is_flat_field_map() {
        let event = DomainEvent::for_workspace(routing::STATUS_IDLE, &meta());
        let body = serde_json::to_value(&event.fields).unwrap();

        assert_eq!(body[ALLOCATION_FIELD], "07".repeat(16));
        assert_eq!(body[STUDENT_FIELD], uuid::Uuid::nil().to_string());
        assert_eq!(body.as_object().unwrap().len(), 3);
    }

    #[test]
    fn meta_from_fields_requires_all_fields() {
        let mut fields = meta().to_fields();
        fields.insert("extra".to_string(), "ignored".to_string());
        assert_eq!(WorkspaceMeta::from_fields(&fields), Some(meta()));

        fields.remove(STUDENT_FIELD);
        assert_eq!(WorkspaceMeta::from_fields(&fields), None);
    }

    #[test]
    fn meta_parses_allocation() {
        assert_eq!(
            meta().allocation_id().unwrap(),
            AllocationId::from_bytes([7; 16])
        );

        let mut bad = meta();
        bad.workspace_allocation_id = "42".to_string();
        assert!(bad.allocation_id().is_err());
    }
}
