//! Message broker plumbing for labspace domain events.
//!
//! Events travel over one topic exchange. The watcher and the supervisor
//! publish through a [`Publisher`]; the consumer reads a durable queue bound
//! to the `workspace.#` and `k8s.#` families through an [`EventConsumer`].
//! Bodies are the JSON encoding of the event's field map.
//!
//! # Example
//!
//! ```no_run
//! use labspace_broker::{AmqpPublisher, BrokerConfig, EventPublisher};
//! use labspace_core::{routing, DomainEvent, EventFields};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = AmqpPublisher::from_config(BrokerConfig::from_env());
//! publisher
//!     .publish(&DomainEvent::new(routing::TEST_CONNECTION, EventFields::new()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod amqp;
pub mod config;
pub mod error;
pub mod publisher;
pub mod topology;

pub use amqp::{AmqpConnector, AmqpLink, AmqpPublisher, EventConsumer, MessageHandler};
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use publisher::{Connector, EventPublisher, Link, Publisher};
pub use topology::{is_routed_to_queue, topic_matches, QUEUE_BINDINGS};

#[cfg(any(test, feature = "test-utils"))]
pub use publisher::mock::MockPublisher;
