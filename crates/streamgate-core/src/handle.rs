//! Broker client seam.
//!
//! The proxy never talks to the broker directly. It obtains producer handles
//! from a [`HandleFactory`] and publishes through [`ProducerHandle`]. Both are
//! implemented by the broker client integration (see [`crate::memory`] for the
//! in-process one).
//!
//! ## Send model
//!
//! `send_async` has two failure channels, matching how broker clients behave:
//!
//! - a synchronous `Err` when the handle refuses the message outright (closed
//!   handle, queue full)
//! - an asynchronous failure delivered through [`PendingSend::wait_ack`] when
//!   the broker does not acknowledge the message
//!
//! ```ignore
//! let pending = handle.send_async(Bytes::from_static(b"hello"))?;
//! let message_id = pending.wait_ack().await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{HandleError, Result};
use crate::topic::TopicKey;

/// Broker-assigned position of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub ledger_id: u64,
    pub entry_id: u64,
}

impl MessageId {
    pub fn new(ledger_id: u64, entry_id: u64) -> Self {
        Self {
            ledger_id,
            entry_id,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ledger_id, self.entry_id)
    }
}

/// A message accepted by a handle whose broker acknowledgment is outstanding.
pub struct PendingSend {
    ack: BoxFuture<'static, Result<MessageId>>,
}

impl PendingSend {
    /// Wrap any acknowledgment future.
    pub fn new<F>(ack: F) -> Self
    where
        F: std::future::Future<Output = Result<MessageId>> + Send + 'static,
    {
        Self { ack: ack.boxed() }
    }

    /// Acknowledgment driven by a oneshot channel.
    ///
    /// A dropped sender is reported as an ack failure.
    pub fn from_receiver(rx: oneshot::Receiver<Result<MessageId>>) -> Self {
        Self::new(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(HandleError::Ack(
                    "acknowledgment channel dropped".to_string(),
                )),
            }
        })
    }

    /// Already acknowledged.
    pub fn ready(result: Result<MessageId>) -> Self {
        Self::new(futures::future::ready(result))
    }

    /// Wait for the broker acknowledgment.
    pub async fn wait_ack(self) -> Result<MessageId> {
        self.ack.await
    }
}

impl fmt::Debug for PendingSend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSend").finish_non_exhaustive()
    }
}

/// Open producer connection to a single topic.
#[async_trait]
pub trait ProducerHandle: Send + Sync + 'static {
    /// Topic this handle publishes to.
    fn topic(&self) -> &TopicKey;

    /// Hand the payload to the broker client.
    ///
    /// Returns once the client has accepted the message; the returned
    /// [`PendingSend`] resolves on broker acknowledgment.
    fn send_async(&self, payload: Bytes) -> Result<PendingSend>;

    /// Release the connection. Idempotent and best-effort.
    async fn close(&self) -> Result<()>;
}

/// Creates producer handles. Construction is synchronous and may be slow.
pub trait HandleFactory: Send + Sync + 'static {
    fn create_handle(&self, key: &TopicKey) -> Result<Arc<dyn ProducerHandle>>;
}
