//! Labspace Consumer - routes domain events to workspace tasks.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use labspace_broker::{AmqpPublisher, BrokerConfig, EventConsumer, EventPublisher};
use labspace_control::{
    spawn_sweeps, ControlConfig, EventRouter, LaunchRequest, RetryPolicy, WorkerPool, WorkspaceTasks,
};
use labspace_core::events::ALLOCATION_FIELD;
use labspace_core::{routing, AllocationId, AssignmentId, DomainEvent, EventFields, UserId};
use labspace_provisioner::{K8sProvisioner, Provisioner, ProvisionerConfig};
use labspace_store::RocksStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Labspace event consumer.
#[derive(Parser, Debug)]
#[command(name = "labspace-consumer")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume events until the broker connection fails.
    Start,
    /// Check broker and cluster connectivity, exiting non-zero on failure.
    CheckReadiness,
    /// Publish a launch request for a learner's workspace.
    RequestLaunch {
        /// Assignment reference.
        #[arg(long)]
        assignment_id: AssignmentId,
        /// Learner reference.
        #[arg(long)]
        student_id: UserId,
        /// Instructor opening a review session.
        #[arg(long)]
        instructor_id: Option<UserId>,
    },
    /// Publish the removal of an allocation.
    DeleteAllocation {
        /// Allocation to remove.
        #[arg(long)]
        allocation_id: AllocationId,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,labspace=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ControlConfig::from_env();
    let broker = BrokerConfig::from_env();
    let provisioner_config = ProvisionerConfig::from_env();

    match args.command {
        Command::Start => {
            tracing::info!(
                data_dir = %config.data_dir,
                workers = config.workers,
                sweeps = config.enable_sweeps,
                "Starting Labspace Consumer"
            );

            let store = Arc::new(RocksStore::open(&config.data_dir)?);
            let provisioner = Arc::new(K8sProvisioner::new(provisioner_config.clone()).await?);
            let handler = Arc::new(
                WorkspaceTasks::new(store, provisioner, config.clone()).with_readiness(
                    provisioner_config.readiness_retries,
                    provisioner_config.readiness_backoff,
                ),
            );
            let policy = RetryPolicy {
                max_retries: config.max_retries,
                backoff: config.retry_backoff,
            };
            let (queue, _dispatcher) = WorkerPool::start(handler, config.workers, policy);
            let _sweeps = if config.enable_sweeps {
                spawn_sweeps(&queue, &config)
            } else {
                Vec::new()
            };

            let router = EventRouter::new(queue);
            EventConsumer::new(broker).run(&router).await?;
        }
        Command::CheckReadiness => {
            let publisher = AmqpPublisher::from_config(broker);
            if let Err(e) = publisher
                .publish(&DomainEvent::new(routing::TEST_CONNECTION, EventFields::new()))
                .await
            {
                tracing::error!(error = %e, "Connection to broker failed");
                std::process::exit(1);
            }
            let provisioner = K8sProvisioner::new(provisioner_config).await?;
            if let Err(e) = provisioner.ping().await {
                tracing::error!(error = %e, "Connection to cluster failed");
                std::process::exit(1);
            }
            tracing::info!("Consumer is ready");
        }
        Command::RequestLaunch {
            assignment_id,
            student_id,
            instructor_id,
        } => {
            let mut request = LaunchRequest::new(assignment_id, student_id);
            request.instructor_id = instructor_id;
            AmqpPublisher::from_config(broker)
                .publish(&DomainEvent::new(routing::LAUNCH_REQUESTED, request.to_fields()))
                .await?;
            tracing::info!(allocation_id = %request.allocation_id(), "Launch requested");
        }
        Command::DeleteAllocation { allocation_id } => {
            let mut fields = EventFields::new();
            fields.insert(ALLOCATION_FIELD.to_string(), allocation_id.to_hex());
            AmqpPublisher::from_config(broker)
                .publish(&DomainEvent::new(routing::ALLOCATION_DELETED, fields))
                .await?;
            tracing::info!(allocation_id = %allocation_id, "Allocation deletion requested");
        }
    }

    Ok(())
}
