//! Error types for the broker crate.

use thiserror::Error;

/// Errors that can occur while talking to the message broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// AMQP protocol or transport error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// Event body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection dropped while a message was in flight.
    #[error("Broker connection lost: {0}")]
    ConnectionLost(String),

    /// The consumer stream ended.
    #[error("Consumer stream closed")]
    StreamClosed,
}

impl BrokerError {
    /// Whether the error means the connection or channel is dead and a fresh
    /// connection may succeed.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Amqp(e) => matches!(
                e,
                lapin::Error::InvalidChannelState(_)
                    | lapin::Error::InvalidConnectionState(_)
                    | lapin::Error::IOError(_)
                    | lapin::Error::MissingHeartbeatError
            ),
            Self::ConnectionLost(_) | Self::StreamClosed => true,
            Self::Serialization(_) => false,
        }
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.is_connection_lost()
    }
}

/// A specialized Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
