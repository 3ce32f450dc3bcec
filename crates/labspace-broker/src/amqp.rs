//! AMQP transport built on `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

use crate::config::BrokerConfig;
use crate::publisher::{Connector, Link, Publisher};
use crate::topology::QUEUE_BINDINGS;
use crate::{BrokerError, Result};

const CONSUMER_TAG: &str = "labspace-consumer";

async fn open_channel(config: &BrokerConfig) -> Result<(Connection, Channel)> {
    let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok((connection, channel))
}

/// Opens AMQP connections and declares the event exchange.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    config: BrokerConfig,
}

impl AmqpConnector {
    /// Create a connector for the configured broker.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

/// An open AMQP connection with one channel.
pub struct AmqpLink {
    // Dropping the connection closes the channel.
    _connection: Connection,
    channel: Channel,
    exchange: String,
}

#[async_trait]
impl Connector for AmqpConnector {
    type Link = AmqpLink;

    async fn connect(&self) -> Result<AmqpLink> {
        let (connection, channel) = open_channel(&self.config).await?;
        info!(exchange = %self.config.exchange, "Connected to broker");
        Ok(AmqpLink {
            _connection: connection,
            channel,
            exchange: self.config.exchange.clone(),
        })
    }
}

#[async_trait]
impl Link for AmqpLink {
    async fn send(&self, routing_key: &str, body: &[u8]) -> Result<()> {
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        Ok(())
    }
}

/// Publisher over AMQP.
pub type AmqpPublisher = Publisher<AmqpConnector>;

impl AmqpPublisher {
    /// Create a publisher for the configured broker.
    #[must_use]
    pub fn from_config(config: BrokerConfig) -> Self {
        Publisher::new(AmqpConnector::new(config))
    }
}

/// Receives messages delivered to the consumer queue.
///
/// Handlers must not block: the consumer reads the next message only after
/// `handle` returns.
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    fn handle(&self, routing_key: &str, body: &[u8]);
}

/// Consumes domain events from the durable queue.
pub struct EventConsumer {
    config: BrokerConfig,
}

impl EventConsumer {
    /// Create a consumer for the configured broker.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Declare the topology and deliver every message to `handler`.
    ///
    /// Messages are auto-acknowledged. Runs until the connection fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology cannot be declared or the stream fails.
    pub async fn run<H: MessageHandler + ?Sized>(&self, handler: &H) -> Result<()> {
        let (_connection, channel) = open_channel(&self.config).await?;

        let queue = channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue_name = queue.name().as_str().to_string();

        for pattern in QUEUE_BINDINGS {
            channel
                .queue_bind(
                    &queue_name,
                    &self.config.exchange,
                    pattern,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let mut consumer = channel
            .basic_consume(
                &queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(queue = %queue_name, exchange = %self.config.exchange, "Started consuming");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let routing_key = delivery.routing_key.as_str();
            debug!(routing_key, bytes = delivery.data.len(), "Received message");
            handler.handle(routing_key, &delivery.data);
        }

        Err(BrokerError::StreamClosed)
    }

    /// Check that the broker accepts connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened.
    pub async fn check_connection(&self) -> Result<()> {
        let (connection, _channel) = open_channel(&self.config).await?;
        connection.close(0, "readiness check").await?;
        Ok(())
    }
}
