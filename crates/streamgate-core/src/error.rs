//! Error types for the streamgate publish path.
//!
//! Errors are split by the side that raises them:
//!
//! - [`HandleError`]: raised by the broker client (handle construction, send,
//!   acknowledgment, close). These come from the `HandleFactory` and
//!   `ProducerHandle` implementations.
//! - [`PublishError`]: the terminal outcome of a failed publish call. Every
//!   `HandleError` reaching the pipeline is mapped onto one of these kinds.
//! - [`ConfigError`]: an environment variable could not be parsed.
//!
//! None of these are retried at this layer; retry belongs to the caller.

use std::sync::Arc;

use thiserror::Error;

use crate::topic::TopicKey;

/// Convenience alias for broker-side results.
pub type Result<T> = std::result::Result<T, HandleError>;

/// Failure reported by the broker client.
#[derive(Debug, Clone, Error)]
pub enum HandleError {
    /// The factory could not open a producer for the topic.
    #[error("Failed to create producer for {topic}: {reason}")]
    Construction { topic: TopicKey, reason: String },

    /// The handle has already been closed and rejects further sends.
    #[error("Producer for {0} is already closed")]
    Closed(TopicKey),

    /// The send call was rejected before reaching the broker.
    #[error("Send failed: {0}")]
    Send(String),

    /// The broker did not acknowledge the message.
    #[error("Broker acknowledgment failed: {0}")]
    Ack(String),

    /// Releasing the producer failed.
    #[error("Close failed: {0}")]
    Close(String),
}

/// Terminal failure of a single publish call.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The request was rejected before any work was done.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No producer handle could be obtained for the topic.
    #[error("Failed to acquire producer for {topic}: {source}")]
    HandleAcquisition {
        topic: TopicKey,
        #[source]
        source: Arc<HandleError>,
    },

    /// The message was not delivered (send rejected or ack failed).
    #[error("Failed to send to {topic}: {source}")]
    Send {
        topic: TopicKey,
        #[source]
        source: HandleError,
    },
}

impl PublishError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Validation(_) => "validation",
            PublishError::HandleAcquisition { .. } => "handle_acquisition",
            PublishError::Send { .. } => "send",
        }
    }
}

/// An environment override could not be applied.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}
