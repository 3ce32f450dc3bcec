//! Labspace Watcher - publishes workspace pod lifecycle events.

use clap::{Parser, Subcommand};
use kube::Client;
use labspace_broker::{AmqpPublisher, BrokerConfig, EventPublisher};
use labspace_core::{routing, DomainEvent, EventFields};
use labspace_watcher::{ClusterWatcher, KubeEventSource, KubePodLookup, WatcherConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Labspace cluster watcher.
#[derive(Parser, Debug)]
#[command(name = "labspace-watcher")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch cluster events until a fatal error.
    Start,
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
    let config = WatcherConfig::from_env();
    let publisher = AmqpPublisher::from_config(BrokerConfig::from_env());
    let client = Client::try_default().await?;

    match args.command {
        Command::Start => {
            tracing::info!(
                prefix = %config.namespace_prefix,
                excluded = ?config.excluded_namespaces,
                "Starting Labspace Watcher"
            );
            publisher.connect().await?;

            let source = KubeEventSource::new(client.clone(), &config.field_selector());
            let watcher = ClusterWatcher::new(source, KubePodLookup::new(client), publisher, config);
            watcher.run().await?;
        }
        Command::CheckReadiness => {
            if let Err(e) = publisher
                .publish(&DomainEvent::new(routing::TEST_CONNECTION, EventFields::new()))
                .await
            {
                tracing::error!(error = %e, "Connection to broker failed");
                std::process::exit(1);
            }
            if let Err(e) = KubePodLookup::new(client).ping().await {
                tracing::error!(error = %e, "Connection to cluster failed");
                std::process::exit(1);
            }
            tracing::info!("Watcher is ready");
        }
    }

    Ok(())
}
