//! One pass of the activity check.

use chrono::Utc;
use futures::StreamExt;
use tracing::{info, warn};

use labspace_broker::EventPublisher;
use labspace_core::{routing, DomainEvent};

use crate::config::SupervisorConfig;
use crate::health::{evaluate, Activity, HealthReport};
use crate::inventory::{WorkspaceInventory, WorkspaceTarget};
use crate::{Result, SupervisorError};

/// Counts from one activity check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    /// Workspaces polled.
    pub polled: usize,
    /// `workspace.status.alive` events published.
    pub alive: usize,
    /// `workspace.status.idle` events published.
    pub idle: usize,
    /// Inactive below the threshold; nothing published.
    pub quiet: usize,
    /// Polls or publishes that failed.
    pub failed: usize,
}

/// Polls workspace liveness endpoints and publishes activity events.
pub struct ActivitySupervisor<I, P> {
    inventory: I,
    publisher: P,
    http: reqwest::Client,
    config: SupervisorConfig,
}

impl<I, P> ActivitySupervisor<I, P>
where
    I: WorkspaceInventory,
    P: EventPublisher,
{
    /// Create a supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(inventory: I, publisher: P, config: SupervisorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SupervisorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            inventory,
            publisher,
            http,
            config,
        })
    }

    async fn poll(&self, target: &WorkspaceTarget) -> Result<HealthReport> {
        let report = self
            .http
            .get(&target.healthz_url)
            .send()
            .await?
            .error_for_status()?
            .json::<HealthReport>()
            .await?;
        Ok(report)
    }

    /// Run one activity check over every eligible workspace.
    ///
    /// A failed poll or publish only affects its own workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspaces cannot be listed.
    pub async fn run_once(&self) -> Result<CheckSummary> {
        let targets = self
            .inventory
            .ready_workspaces(Utc::now(), self.config.readiness_grace)
            .await?;

        let mut summary = CheckSummary {
            polled: targets.len(),
            ..Default::default()
        };
        if targets.is_empty() {
            info!("No workspaces to process");
            return Ok(summary);
        }

        info!(count = targets.len(), "Polling workspace liveness");
        let results: Vec<_> = futures::stream::iter(&targets)
            .map(|target| async move { (target, self.poll(target).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let now = Utc::now();
        for (target, result) in results {
            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    warn!(namespace = %target.namespace, error = %e, "Liveness poll failed");
                    summary.failed += 1;
                    continue;
                }
            };

            let routing_key = match evaluate(&report, now, self.config.idle_threshold) {
                Activity::Alive => routing::STATUS_ALIVE,
                Activity::Idle { idle_minutes } => {
                    info!(namespace = %target.namespace, idle_minutes, "Workspace is idle");
                    routing::STATUS_IDLE
                }
                Activity::Quiet { idle_minutes } => {
                    info!(namespace = %target.namespace, idle_minutes, "Workspace inactive below threshold");
                    summary.quiet += 1;
                    continue;
                }
            };

            let event = DomainEvent::for_workspace(routing_key, &target.meta);
            match self.publisher.publish(&event).await {
                Ok(()) if routing_key == routing::STATUS_ALIVE => summary.alive += 1,
                Ok(()) => summary.idle += 1,
                Err(e) => {
                    warn!(namespace = %target.namespace, error = %e, "Failed to publish activity event");
                    summary.failed += 1;
                }
            }
        }

        info!(
            polled = summary.polled,
            alive = summary.alive,
            idle = summary.idle,
            quiet = summary.quiet,
            failed = summary.failed,
            "Activity check complete"
        );
        Ok(summary)
    }
}
