//! Publish Pipeline
//!
//! One publish call walks a fixed sequence and produces exactly one result:
//!
//! ```text
//! validate → select shard → acquire handle → send → result
//!                                               │
//!                     at_most_once: Ok as soon as the handle accepts
//!                     at_least_once: Ok/Err once the broker acks
//! ```
//!
//! Any stage that fails ends the call; nothing is retried here.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use streamgate_observability::metrics;

use crate::cache::HandleCache;
use crate::config::DeliverySemantic;
use crate::error::PublishError;
use crate::handle::{MessageId, PendingSend};
use crate::shard::ShardSelector;
use crate::topic::TopicKey;

/// Successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Milliseconds from request start to result
    pub elapsed_millis: i64,

    /// Physical topic the message went to
    pub topic: TopicKey,

    /// Broker-assigned id; only known when the ack was awaited
    pub message_id: Option<MessageId>,
}

/// Sends messages through cached producer handles.
pub struct Publisher {
    cache: HandleCache,
    shards: ShardSelector,
    semantic: DeliverySemantic,
}

impl Publisher {
    pub fn new(cache: HandleCache, shards: ShardSelector, semantic: DeliverySemantic) -> Self {
        Self {
            cache,
            shards,
            semantic,
        }
    }

    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    pub fn shards(&self) -> &ShardSelector {
        &self.shards
    }

    pub fn semantic(&self) -> DeliverySemantic {
        self.semantic
    }

    /// Publish `message` to `tenant/namespace/topic`.
    pub async fn publish(
        &self,
        tenant: &str,
        namespace: &str,
        topic: &str,
        message: String,
    ) -> Result<PublishOutcome, PublishError> {
        if message.is_empty() {
            tracing::warn!(
                tenant = %tenant,
                namespace = %namespace,
                topic = %topic,
                "Rejected publish with empty message"
            );
            let err = PublishError::Validation("msg can't be empty".to_string());
            record_failure(&err);
            return Err(err);
        }

        let started = Instant::now();
        let logical = TopicKey::new(tenant, namespace, topic);
        let physical = self.shards.shard(&logical);

        let handle = match self.cache.get(&physical).await {
            Ok(handle) => handle,
            Err(source) => {
                tracing::error!(
                    topic = %physical,
                    cause = %source,
                    "Failed to acquire producer handle"
                );
                let err = PublishError::HandleAcquisition {
                    topic: physical,
                    source,
                };
                record_failure(&err);
                return Err(err);
            }
        };

        let pending = match handle.send_async(Bytes::from(message)) {
            Ok(pending) => pending,
            Err(source) => {
                tracing::error!(topic = %physical, error = %source, "Send rejected by producer");
                let err = PublishError::Send {
                    topic: physical,
                    source,
                };
                record_failure(&err);
                return Err(err);
            }
        };

        let message_id = match self.semantic {
            DeliverySemantic::AtMostOnce => {
                observe_ack(physical.clone(), pending);
                None
            }
            DeliverySemantic::AtLeastOnce => match pending.wait_ack().await {
                Ok(message_id) => {
                    tracing::debug!(
                        topic = %physical,
                        message_id = %message_id,
                        "Message acknowledged"
                    );
                    Some(message_id)
                }
                Err(source) => {
                    tracing::error!(topic = %physical, error = %source, "Send failed");
                    let err = PublishError::Send {
                        topic: physical,
                        source,
                    };
                    record_failure(&err);
                    return Err(err);
                }
            },
        };

        let elapsed = started.elapsed();
        metrics::PUBLISH_TOTAL
            .with_label_values(&[self.semantic.as_str()])
            .inc();
        metrics::PUBLISH_LATENCY
            .with_label_values(&[self.semantic.as_str()])
            .observe(elapsed.as_secs_f64());

        Ok(PublishOutcome {
            elapsed_millis: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            topic: physical,
            message_id,
        })
    }
}

/// Await the ack in the background; failures after the caller got its answer
/// are only logged.
fn observe_ack(topic: TopicKey, pending: PendingSend) {
    tokio::spawn(async move {
        match pending.wait_ack().await {
            Ok(message_id) => {
                tracing::debug!(topic = %topic, message_id = %message_id, "Message acknowledged");
            }
            Err(e) => {
                metrics::PUBLISH_ERRORS_TOTAL
                    .with_label_values(&["late_ack"])
                    .inc();
                tracing::warn!(
                    topic = %topic,
                    error = %e,
                    "Send failed after at-most-once publish completed"
                );
            }
        }
    });
}

fn record_failure(err: &PublishError) {
    metrics::PUBLISH_ERRORS_TOTAL
        .with_label_values(&[err.kind()])
        .inc();
}
