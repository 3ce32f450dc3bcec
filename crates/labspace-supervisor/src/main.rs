//! Labspace Supervisor - reports workspace activity.

use clap::{Parser, Subcommand};
use kube::Client;
use labspace_broker::{AmqpPublisher, BrokerConfig, EventPublisher};
use labspace_core::{routing, DomainEvent, EventFields};
use labspace_supervisor::{ActivitySupervisor, KubeInventory, SupervisorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Labspace idle-health supervisor.
#[derive(Parser, Debug)]
#[command(name = "labspace-supervisor")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one activity check and exit.
    RunActivityCheck,
    /// Check broker and cluster connectivity, exiting non-zero on failure.
    CheckReadiness,
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
    let config = SupervisorConfig::from_env();
    let publisher = AmqpPublisher::from_config(BrokerConfig::from_env());
    let client = Client::try_default().await?;
    let inventory = KubeInventory::new(client, config.pod_selector.clone());

    match args.command {
        Command::RunActivityCheck => {
            tracing::info!(
                grace_secs = config.readiness_grace.as_secs(),
                idle_threshold_secs = config.idle_threshold.as_secs(),
                concurrency = config.concurrency,
                "Starting activity check"
            );
            let supervisor = ActivitySupervisor::new(inventory, publisher, config)?;
            supervisor.run_once().await?;
        }
        Command::CheckReadiness => {
            if let Err(e) = publisher
                .publish(&DomainEvent::new(routing::TEST_CONNECTION, EventFields::new()))
                .await
            {
                tracing::error!(error = %e, "Connection to broker failed");
                std::process::exit(1);
            }
            if let Err(e) = inventory.ping().await {
                tracing::error!(error = %e, "Connection to cluster failed");
                std::process::exit(1);
            }
            tracing::info!("Supervisor is ready");
        }
    }

    Ok(())
}
