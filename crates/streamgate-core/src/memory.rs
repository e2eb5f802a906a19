//! In-process broker.
//!
//! A [`HandleFactory`] that keeps every topic as an append-only log in memory.
//! The proxy binary uses it when no external broker is wired in, and the
//! integration tests use it to observe what was published.
//!
//! Message ids are `ledger:entry`, where each topic gets its own ledger id on
//! first use and entries count up from zero.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{HandleError, Result};
use crate::handle::{HandleFactory, MessageId, PendingSend, ProducerHandle};
use crate::topic::TopicKey;

struct TopicLog {
    ledger_id: u64,
    messages: Vec<Bytes>,
}

#[derive(Default)]
struct BrokerState {
    topics: Mutex<HashMap<TopicKey, TopicLog>>,
    unavailable: Mutex<HashSet<TopicKey>>,
    next_ledger: AtomicU64,
    producers_created: AtomicU64,
    producers_closed: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory broker and producer factory.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make producer creation for `key` fail until [`MemoryBroker::restore_topic`].
    pub fn fail_topic(&self, key: &TopicKey) {
        lock(&self.state.unavailable).insert(key.clone());
    }

    pub fn restore_topic(&self, key: &TopicKey) {
        lock(&self.state.unavailable).remove(key);
    }

    /// Payloads published to `key`, in order.
    pub fn messages(&self, key: &TopicKey) -> Vec<Bytes> {
        lock(&self.state.topics)
            .get(key)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Topics that have had a producer opened on them.
    pub fn topics(&self) -> Vec<TopicKey> {
        let mut topics: Vec<_> = lock(&self.state.topics).keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of successful producer constructions.
    pub fn producers_created(&self) -> u64 {
        self.state.producers_created.load(Ordering::SeqCst)
    }

    /// Number of producers closed.
    pub fn producers_closed(&self) -> u64 {
        self.state.producers_closed.load(Ordering::SeqCst)
    }
}

impl HandleFactory for MemoryBroker {
    fn create_handle(&self, key: &TopicKey) -> Result<Arc<dyn ProducerHandle>> {
        if lock(&self.state.unavailable).contains(key) {
            return Err(HandleError::Construction {
                topic: key.clone(),
                reason: "topic unavailable".to_string(),
            });
        }

        lock(&self.state.topics)
            .entry(key.clone())
            .or_insert_with(|| TopicLog {
                ledger_id: self.state.next_ledger.fetch_add(1, Ordering::SeqCst),
                messages: Vec::new(),
            });
        self.state.producers_created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(topic = %key, "Opened in-memory producer");

        Ok(Arc::new(MemoryProducer {
            key: key.clone(),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Producer handle over a [`MemoryBroker`] topic.
pub struct MemoryProducer {
    key: TopicKey,
    closed: AtomicBool,
    state: Arc<BrokerState>,
}

#[async_trait]
impl ProducerHandle for MemoryProducer {
    fn topic(&self) -> &TopicKey {
        &self.key
    }

    fn send_async(&self, payload: Bytes) -> Result<PendingSend> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HandleError::Closed(self.key.clone()));
        }

        let mut topics = lock(&self.state.topics);
        let log = topics
            .get_mut(&self.key)
            .ok_or_else(|| HandleError::Send(format!("topic {} was deleted", self.key)))?;
        log.messages.push(payload);
        let message_id = MessageId::new(log.ledger_id, (log.messages.len() - 1) as u64);

        Ok(PendingSend::ready(Ok(message_id)))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.producers_closed.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(topic = %self.key, "Closed in-memory producer");
        }
        Ok(())
    }
}
