//! Streamgate Core - Producer Handles and the Publish Pipeline
//!
//! The publishing side of an HTTP-to-broker proxy. A publish request names a
//! logical topic; the proxy picks the physical topic (optionally rotating over
//! shards), borrows a cached producer handle for it and sends the payload.
//!
//! ```text
//! Publisher::publish(tenant, namespace, topic, msg)
//!     │
//!     ├─ ShardSelector   orders → orders_2
//!     ├─ HandleCache     TopicKey → Arc<dyn ProducerHandle> (built by HandleFactory)
//!     └─ ProducerHandle  send_async → PendingSend → MessageId
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamgate_core::{
//!     DeliverySemantic, HandleCache, HandleCacheConfig, MemoryBroker, Publisher, ShardSelector,
//! };
//!
//! let cache = HandleCache::new(Arc::new(MemoryBroker::new()), HandleCacheConfig::default());
//! let publisher = Publisher::new(cache, ShardSelector::new(3), DeliverySemantic::AtLeastOnce);
//!
//! let outcome = publisher
//!     .publish("public", "default", "orders", "hello".to_string())
//!     .await?;
//! println!("published to {} in {}ms", outcome.topic, outcome.elapsed_millis);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod publisher;
pub mod shard;
pub mod topic;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{HandleCache, HandleCacheConfig, HandleResult};
pub use config::{DeliverySemantic, ProxyConfig};
pub use error::{ConfigError, HandleError, PublishError, Result};
pub use handle::{HandleFactory, MessageId, PendingSend, ProducerHandle};
pub use memory::{MemoryBroker, MemoryProducer};
pub use publisher::{PublishOutcome, Publisher};
pub use shard::ShardSelector;
pub use topic::TopicKey;
