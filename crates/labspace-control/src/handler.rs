//! Task handlers.
//!
//! A handler returns the tasks that continue its workflow. The worker pool
//! enqueues them only after the handler succeeded, which is what orders
//! teardown: terminate session, then scale down, then delete the namespace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use labspace_core::events::ALLOCATION_FIELD;
use labspace_core::{AllocationId, EventFields, SessionId};
use labspace_provisioner::{refresh_status, DeleteOutcome, Provisioner, ScaleOutcome};
use labspace_store::{ClusterStatus, Store, WorkspaceAllocation};

use crate::config::ControlConfig;
use crate::error::Result;
use crate::request::{self, LaunchRequest};
use crate::session;
use crate::task::Task;

const DEFAULT_READINESS_RETRIES: u32 = 7;
const DEFAULT_READINESS_BACKOFF: Duration = Duration::from_millis(300);

/// Executes tasks.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run one task and return its follow-up tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the task failed; retriable errors are retried by
    /// the worker pool.
    async fn handle(&self, task: &Task) -> Result<Vec<Task>>;
}

/// Task handlers backed by the store and the cluster provisioner.
pub struct WorkspaceTasks<S, P: ?Sized> {
    store: Arc<S>,
    provisioner: Arc<P>,
    config: ControlConfig,
    readiness_retries: u32,
    readiness_backoff: Duration,
}

impl<S, P> WorkspaceTasks<S, P>
where
    S: Store + 'static,
    P: Provisioner + ?Sized + 'static,
{
    /// Create the handlers.
    #[must_use]
    pub fn new(store: Arc<S>, provisioner: Arc<P>, config: ControlConfig) -> Self {
        Self {
            store,
            provisioner,
            config,
            readiness_retries: DEFAULT_READINESS_RETRIES,
            readiness_backoff: DEFAULT_READINESS_BACKOFF,
        }
    }

    /// Set how long readiness refreshes wait for the pod.
    #[must_use]
    pub const fn with_readiness(mut self, retries: u32, backoff: Duration) -> Self {
        self.readiness_retries = retries;
        self.readiness_backoff = backoff;
        self
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the allocation an event refers to.
    fn allocation_for(&self, task: &Task, fields: &EventFields) -> Result<Option<WorkspaceAllocation>> {
        let Some(raw) = fields.get(ALLOCATION_FIELD) else {
            warn!(task = %task, ?fields, "Event has no allocation reference");
            return Ok(None);
        };
        let allocation_id = match AllocationId::from_hex(raw) {
            Ok(id) => id,
            Err(e) => {
                warn!(task = %task, allocation_id = %raw, error = %e, "Invalid allocation reference");
                return Ok(None);
            }
        };

        let allocation = self.store.get_allocation(&allocation_id)?;
        if allocation.is_none() {
            info!(task = %task, allocation_id = %allocation_id, "Workspace allocation not found");
        }
        Ok(allocation)
    }

    /// Read the cluster status and record it on the allocation.
    async fn record_status(&self, allocation_id: &AllocationId, wait: bool) -> Result<Option<ClusterStatus>> {
        let status = refresh_status(
            &*self.provisioner,
            allocation_id,
            wait,
            self.readiness_retries,
            self.readiness_backoff,
        )
        .await?;
        self.store
            .update_allocation_status(allocation_id, status, Utc::now())?;
        Ok(status)
    }

    /// Register the allocation and open a session, then queue the launch.
    fn request_launch(&self, fields: &EventFields) -> Result<Vec<Task>> {
        let request = LaunchRequest::from_fields(fields)?;
        let now = Utc::now();
        let allocation = request::register_allocation(&*self.store, &request, now)?;
        let allocation_id = allocation.allocation_id;
        let (session, created) = session::create_session_if_none(
            &*self.store,
            &allocation_id,
            request.instructor_id,
            now,
            &self.config.session,
        )?;

        info!(
            allocation_id = %allocation_id,
            session_id = %session.session_id,
            new_session = created,
            "Requested workspace launch"
        );
        Ok(vec![Task::LaunchWorkspace { allocation_id }])
    }

    /// Remove the allocation, then its namespace if one is left behind.
    fn delete_allocation(&self, fields: &EventFields) -> Result<Vec<Task>> {
        let allocation_id = request::allocation_reference(fields)?;
        if !request::delete_allocation(&*self.store, &allocation_id)? {
            info!(allocation_id = %allocation_id, "Workspace allocation not found");
        }
        Ok(vec![Task::TerminateNamespaceIfExists { allocation_id }])
    }

    async fn launch(&self, allocation_id: &AllocationId) -> Result<Vec<Task>> {
        let Some(allocation) = self.store.get_allocation(allocation_id)? else {
            info!(allocation_id = %allocation_id, "Workspace allocation not found");
            return Ok(Vec::new());
        };

        let set = self.provisioner.apply(&allocation).await?;
        info!(
            allocation_id = %allocation_id,
            namespace = %set.namespace,
            created = set.created_count(),
            "Applied workspace resources"
        );

        let status = self
            .record_status(allocation_id, self.config.launch_waits_for_readiness)
            .await?;
        info!(allocation_id = %allocation_id, ?status, "Launched workspace");
        Ok(Vec::new())
    }

    async fn start_session(&self, task: &Task, fields: &EventFields) -> Result<Vec<Task>> {
        let Some(allocation) = self.allocation_for(task, fields)? else {
            return Ok(Vec::new());
        };
        let id = allocation.allocation_id;
        if session::active_session(&*self.store, &id, Utc::now())?.is_none() {
            info!(allocation_id = %id, "Workspace session not found");
            return Ok(Vec::new());
        }

        self.record_status(&id, true).await?;
        if let Some(started) = session::start(&*self.store, &id, Utc::now())? {
            info!(allocation_id = %id, session_id = %started.session_id, "Started workspace session");
        }
        Ok(Vec::new())
    }

    fn extend_session(&self, task: &Task, fields: &EventFields) -> Result<Vec<Task>> {
        let Some(allocation) = self.allocation_for(task, fields)? else {
            return Ok(Vec::new());
        };
        let id = allocation.allocation_id;
        match session::extend(&*self.store, &id, Utc::now(), &self.config.session)? {
            Some(extended) => info!(
                allocation_id = %id,
                session_id = %extended.session_id,
                expires_at = %extended.expires_at,
                "Extended workspace session"
            ),
            None => info!(allocation_id = %id, "Workspace session not found"),
        }
        Ok(Vec::new())
    }

    fn terminate_session(&self, task: &Task, fields: &EventFields) -> Result<Vec<Task>> {
        let Some(allocation) = self.allocation_for(task, fields)? else {
            return Ok(Vec::new());
        };
        let id = allocation.allocation_id;
        let Some(expired) = session::expire(&*self.store, &id, Utc::now())? else {
            info!(allocation_id = %id, "Workspace session not found");
            return Ok(Vec::new());
        };

        info!(allocation_id = %id, session_id = %expired.session_id, "Terminating workspace session");
        Ok(vec![Task::ScaleDownWorkspace {
            session_id: expired.session_id,
        }])
    }

    async fn scale_down(&self, session_id: &SessionId) -> Result<Vec<Task>> {
        let Some(session) = self.store.get_session(session_id)? else {
            info!(session_id = %session_id, "Workspace session not found");
            return Ok(Vec::new());
        };
        let allocation_id = session.allocation_id;

        match self.provisioner.scale(&allocation_id, 0).await? {
            ScaleOutcome::Scaled => info!(allocation_id = %allocation_id, "Scaled workspace to zero"),
            ScaleOutcome::NotFound => {
                info!(allocation_id = %allocation_id, "Workspace deployment already gone");
            }
        }
        session::terminate(&*self.store, session_id, Utc::now())?;

        Ok(vec![Task::DeleteWorkspaceNamespace { allocation_id }])
    }

    async fn delete_namespace(&self, allocation_id: &AllocationId, wait: bool) -> Result<Vec<Task>> {
        match self.provisioner.delete(allocation_id, wait).await? {
            DeleteOutcome::Deleted => info!(allocation_id = %allocation_id, "Deleted workspace namespace"),
            DeleteOutcome::NotFound => info!(allocation_id = %allocation_id, "No such workspace"),
        }
        Ok(Vec::new())
    }

    /// Scale-down tasks for expired sessions whose workspace is still running.
    fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for session in self.store.list_open_sessions()? {
            if !session.is_expired(now) {
                continue;
            }
            let running = self
                .store
                .get_allocation(&session.allocation_id)?
                .is_some_and(|a| a.cluster_status == Some(ClusterStatus::Running));
            if running {
                tasks.push(Task::ScaleDownWorkspace {
                    session_id: session.session_id,
                });
            }
        }
        info!(count = tasks.len(), "Cleaning up expired sessions");
        Ok(tasks)
    }

    /// Expire sessions past the maximum duration and queue their teardown.
    fn cleanup_max_duration(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for mut session in self.store.list_open_sessions()? {
            if !session.reached_max_duration(now, self.config.session.max_duration) {
                continue;
            }
            info!(
                session_id = %session.session_id,
                allocation_id = %session.allocation_id,
                "Cleaning up workspace on max duration"
            );
            if session.expire(now) {
                self.store.put_session(&session)?;
            }
            tasks.push(Task::ScaleDownWorkspace {
                session_id: session.session_id,
            });
        }
        Ok(tasks)
    }
}

#[async_trait]
impl<S, P> TaskHandler for WorkspaceTasks<S, P>
where
    S: Store + 'static,
    P: Provisioner + ?Sized + 'static,
{
    async fn handle(&self, task: &Task) -> Result<Vec<Task>> {
        match task {
            Task::RequestLaunch(fields) => self.request_launch(fields),
            Task::DeleteAllocation(fields) => self.delete_allocation(fields),
            Task::LaunchWorkspace { allocation_id } => self.launch(allocation_id).await,
            Task::StartSession(fields) => self.start_session(task, fields).await,
            Task::ExtendSession(fields) => self.extend_session(task, fields),
            Task::TerminateSession(fields) => self.terminate_session(task, fields),
            Task::LogLaunchFailure(fields) => {
                error!(?fields, "Workspace launch failed");
                Ok(Vec::new())
            }
            Task::ScaleDownWorkspace { session_id } => self.scale_down(session_id).await,
            Task::DeleteWorkspaceNamespace { allocation_id } => {
                self.delete_namespace(allocation_id, true).await
            }
            Task::TerminateNamespaceIfExists { allocation_id } => {
                self.delete_namespace(allocation_id, false).await
            }
            Task::CleanupExpiredSessions => self.cleanup_expired(Utc::now()),
            Task::CleanupMaxDurationSessions => self.cleanup_max_duration(Utc::now()),
        }
    }
}
