//! Scripted broker client for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{HandleError, Result};
use crate::handle::{HandleFactory, MessageId, PendingSend, ProducerHandle};
use crate::topic::TopicKey;

type AckSender = oneshot::Sender<Result<MessageId>>;

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<(String, String)>>,
    acks: Mutex<VecDeque<AckSender>>,
    next_entry: AtomicU64,
}

pub(crate) struct StubFactory {
    calls: AtomicUsize,
    failing: AtomicBool,
    create_delay: Option<Duration>,
    failing_close: bool,
    manual_acks: bool,
    handles: Mutex<Vec<Arc<StubHandle>>>,
    shared: Arc<Shared>,
}

impl StubFactory {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            create_delay: None,
            failing_close: false,
            manual_acks: false,
            handles: Mutex::new(Vec::new()),
            shared: Arc::new(Shared::default()),
        }
    }

    pub(crate) fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub(crate) fn failing(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }

    /// Sends stay unacknowledged until `complete_next_ack`.
    pub(crate) fn with_manual_acks(mut self) -> Self {
        self.manual_acks = true;
        self
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most recently built handle for `key`.
    pub(crate) fn handle(&self, key: &TopicKey) -> Option<Arc<StubHandle>> {
        self.handles_for(key).pop()
    }

    pub(crate) fn handles_for(&self, key: &TopicKey) -> Vec<Arc<StubHandle>> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .filter(|h| &h.key == key)
            .cloned()
            .collect()
    }

    /// `(topic, message)` pairs in send order.
    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub(crate) fn pending_acks(&self) -> usize {
        self.shared.acks.lock().unwrap().len()
    }

    pub(crate) fn complete_next_ack(&self, result: Result<MessageId>) {
        let sender = self
            .shared
            .acks
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending ack");
        let _ = sender.send(result);
    }
}

impl HandleFactory for StubFactory {
    fn create_handle(&self, key: &TopicKey) -> Result<Arc<dyn ProducerHandle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HandleError::Construction {
                topic: key.clone(),
                reason: "broker unavailable".to_string(),
            });
        }

        let handle = Arc::new(StubHandle {
            key: key.clone(),
            closed: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
            failing_close: self.failing_close,
            manual_acks: self.manual_acks,
            shared: Arc::clone(&self.shared),
        });
        self.handles.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

pub(crate) struct StubHandle {
    key: TopicKey,
    closed: AtomicBool,
    closes: AtomicUsize,
    failing_close: bool,
    manual_acks: bool,
    shared: Arc<Shared>,
}

impl StubHandle {
    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Mark closed without going through the cache.
    pub(crate) fn close_now(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProducerHandle for StubHandle {
    fn topic(&self) -> &TopicKey {
        &self.key
    }

    fn send_async(&self, payload: Bytes) -> Result<PendingSend> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HandleError::Closed(self.key.clone()));
        }
        self.shared.sent.lock().unwrap().push((
            self.key.topic().to_string(),
            String::from_utf8_lossy(&payload).into_owned(),
        ));

        if self.manual_acks {
            let (tx, rx) = oneshot::channel();
            self.shared.acks.lock().unwrap().push_back(tx);
            Ok(PendingSend::from_receiver(rx))
        } else {
            let entry = self.shared.next_entry.fetch_add(1, Ordering::SeqCst);
            Ok(PendingSend::ready(Ok(MessageId::new(0, entry))))
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if self.failing_close {
            return Err(HandleError::Close("connection reset".to_string()));
        }
        Ok(())
    }
}
