//! Reconnecting event publisher.
//!
//! [`Publisher`] owns its connection as explicit state. The connection is
//! opened lazily on first publish; a publish that fails because the
//! connection died is retried exactly once on a fresh connection before the
//! error is surfaced.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use labspace_core::DomainEvent;

use crate::Result;

/// Something that can publish domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be delivered to the broker.
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Opens connections to the broker.
#[async_trait]
pub trait Connector: Send + Sync {
    /// An open connection ready to send.
    type Link: Link;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker is unreachable.
    async fn connect(&self) -> Result<Self::Link>;
}

/// An open broker connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Send a message body under a routing key.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be sent.
    async fn send(&self, routing_key: &str, body: &[u8]) -> Result<()>;
}

/// Publisher with an explicitly owned, lazily opened connection.
pub struct Publisher<C: Connector> {
    connector: C,
    link: Mutex<Option<C::Link>>,
}

impl<C: Connector> Publisher<C> {
    /// Create a publisher. No connection is opened until the first publish.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            link: Mutex::new(None),
        }
    }

    /// Open the connection now instead of on first publish.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker is unreachable.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.is_none() {
            *link = Some(self.connector.connect().await?);
            info!("Publisher connected");
        }
        Ok(())
    }

    /// Whether a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }
}

#[async_trait]
impl<C: Connector> EventPublisher for Publisher<C> {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let body = serde_json::to_vec(&event.fields)?;
        let mut slot = self.link.lock().await;

        let link = match slot.take() {
            Some(link) => link,
            None => self.connector.connect().await?,
        };

        match link.send(&event.routing_key, &body).await {
            Ok(()) => {
                *slot = Some(link);
            }
            Err(e) if e.is_connection_lost() => {
                warn!(routing_key = %event.routing_key, error = %e, "Connection lost, reconnecting");
                drop(link);
                let fresh = self.connector.connect().await?;
                fresh.send(&event.routing_key, &body).await?;
                *slot = Some(fresh);
            }
            Err(e) => {
                *slot = Some(link);
                return Err(e);
            }
        }

        info!(routing_key = %event.routing_key, fields = ?event.fields, "Published event");
        Ok(())
    }
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<T> {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        (**self).publish(event).await
    }
}

/// An in-memory publisher for testing without a broker.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    use crate::BrokerError;

    /// A mock publisher that records every event.
    #[derive(Default)]
    pub struct MockPublisher {
        events: Mutex<Vec<DomainEvent>>,
        fail: Mutex<bool>,
    }

    impl MockPublisher {
        /// Create a new mock publisher.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All events published so far, in order.
        #[must_use]
        pub fn events(&self) -> Vec<DomainEvent> {
            self.events.lock().clone()
        }

        /// Events published under one routing key.
        #[must_use]
        pub fn events_with_key(&self, routing_key: &str) -> Vec<DomainEvent> {
            self.events
                .lock()
                .iter()
                .filter(|e| e.routing_key == routing_key)
                .cloned()
                .collect()
        }

        /// Make every publish fail with a lost connection.
        pub fn fail_publishes(&self, fail: bool) {
            *self.fail.lock() = fail;
        }
    }

    #[async_trait]
    impl EventPublisher for MockPublisher {
        async fn publish(&self, event: &DomainEvent) -> Result<()> {
            if *self.fail.lock() {
                return Err(BrokerError::ConnectionLost("mock failure".to_string()));
            }
            self.events.lock().push(event.clone());
            Ok(())
        }
    }
}
