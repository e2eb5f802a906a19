//! Producer Handle Cache
//!
//! Keeps one live producer handle per [`TopicKey`] and shares it across all
//! concurrent publish requests. Opening a producer on the broker is expensive,
//! so handles are created once, reused, and closed when they fall out of the
//! cache.
//!
//! ## Lifecycle
//!
//! ```text
//! get(key) ──hit──→ same slot (last access refreshed)
//!    │
//!   miss
//!    ↓
//! slot inserted, construction task spawned (owned by the cache)
//!    │                                  ↑
//!    │                 concurrent and later get(key) await the same slot
//!    ├─ Ok  → handed to every waiter
//!    └─ Err → handed to every waiter, slot removed (next get retries)
//!
//! evicted (idle / size / invalidate / refresh) → close() on a spawned task
//! ```
//!
//! Construction never runs inside a caller's future. A caller that is
//! cancelled while waiting leaves the construction running, and the result
//! still lands in the slot.
//!
//! ## Eviction
//!
//! - **Size**: at most `max_entries` slots; least recently accessed goes first.
//!   A slot counts from the moment it is inserted, so constructions still in
//!   flight occupy capacity and can be evicted like resolved ones
//! - **Idle**: a slot not accessed for `idle_expiry` is dropped
//! - **Explicit**: `invalidate` / `invalidate_all` / `shutdown`
//! - **Replaced**: `refresh` swaps in a freshly built handle
//!
//! Every removed slot closes its handle off the caller's task, waiting for the
//! construction first if it is still running. Close errors are logged and
//! counted, never returned.
//!
//! ## Shutdown
//!
//! After `shutdown` starts, lookups fail with [`HandleError::Closed`] and a
//! construction that finishes late closes its own handle instead of handing
//! it out.
//!
//! ## Thread Safety
//!
//! The map is a `moka::future::Cache`, which is internally sharded; lookups
//! for unrelated keys do not contend on a single lock. `HandleCache` is cheap
//! to clone and all clones share the same entries.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::ops::compute::Op;
use moka::policy::EvictionPolicy;
use streamgate_observability::metrics;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::task::TaskTracker;

use crate::error::HandleError;
use crate::handle::{HandleFactory, ProducerHandle};
use crate::topic::TopicKey;

/// Outcome of a cache lookup. The error is shared by every caller that
/// waited on the same construction attempt.
pub type HandleResult = std::result::Result<Arc<dyn ProducerHandle>, Arc<HandleError>>;

type SharedHandle = Shared<BoxFuture<'static, HandleResult>>;

/// Sizing and expiry of the handle cache.
#[derive(Debug, Clone)]
pub struct HandleCacheConfig {
    /// Maximum number of cached handles (default: 3000)
    pub max_entries: u64,

    /// Drop handles not accessed for this long (default: 600s)
    pub idle_expiry: Duration,
}

impl Default for HandleCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 3000,
            idle_expiry: Duration::from_secs(600),
        }
    }
}

/// Cache entry: the (possibly still running) construction of one handle.
///
/// The handle is closed exactly once, either when the cache evicts the slot
/// or, if the slot never made it into the cache, when it is dropped.
struct HandleSlot {
    id: u64,
    key: TopicKey,
    ready: SharedHandle,
    released: AtomicBool,
    closers: TaskTracker,
}

impl HandleSlot {
    fn new(id: u64, key: TopicKey, ready: SharedHandle, closers: TaskTracker) -> Self {
        Self {
            id,
            key,
            ready,
            released: AtomicBool::new(false),
            closers,
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.ready.peek(), Some(Err(_)))
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            schedule_close(&self.closers, self.key.clone(), self.ready.clone());
        }
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        self.release();
    }
}

/// Keyed asynchronous cache of producer handles.
#[derive(Clone)]
pub struct HandleCache {
    handles: Cache<TopicKey, Arc<HandleSlot>>,
    factory: Arc<dyn HandleFactory>,
    builders: TaskTracker,
    closers: TaskTracker,
    closing: Arc<AtomicBool>,
    next_slot: Arc<AtomicU64>,
    drain: Arc<Mutex<()>>,
}

impl HandleCache {
    /// Create a cache that builds handles with `factory`.
    pub fn new(factory: Arc<dyn HandleFactory>, config: HandleCacheConfig) -> Self {
        let handles = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_idle(config.idle_expiry)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key: Arc<TopicKey>, slot: Arc<HandleSlot>, cause| {
                on_removal(&key, &slot, cause);
            })
            .build();

        Self {
            handles,
            factory,
            builders: TaskTracker::new(),
            closers: TaskTracker::new(),
            closing: Arc::new(AtomicBool::new(false)),
            next_slot: Arc::new(AtomicU64::new(0)),
            drain: Arc::new(Mutex::new(())),
        }
    }

    /// Get the handle for `key`, constructing it on first use.
    ///
    /// Concurrent callers for a key that is still being constructed wait on the
    /// same attempt, so the factory runs once no matter how many requests
    /// arrive or give up. A failed attempt is delivered to all of them and is
    /// not cached.
    pub async fn get(&self, key: &TopicKey) -> HandleResult {
        if self.is_closing() {
            return Err(Arc::new(HandleError::Closed(key.clone())));
        }

        let slot = self
            .handles
            .get_with(key.clone(), async { self.spawn_construction(key.clone()) })
            .await;

        let result = slot.ready.clone().await;
        if result.is_err() {
            remove_slot(&self.handles, key, slot.id).await;
        }
        result
    }

    /// Build a new handle for `key` and swap it in, closing the previous one.
    ///
    /// On failure the cached handle (if any) stays in place.
    pub async fn refresh(&self, key: &TopicKey) -> HandleResult {
        if self.is_closing() {
            return Err(Arc::new(HandleError::Closed(key.clone())));
        }

        let id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let factory = Arc::clone(&self.factory);
        let closing = Arc::clone(&self.closing);
        let handles = self.handles.clone();
        let closers = self.closers.clone();
        let task_key = key.clone();

        let task = self.builders.spawn(async move {
            let handle = match construct(factory, task_key.clone(), &closing).await {
                Ok(handle) => handle,
                Err(e) => return Err(Arc::new(e)),
            };
            let ready: SharedHandle = future::ready(Ok(Arc::clone(&handle))).boxed().shared();
            let slot = HandleSlot::new(id, task_key.clone(), ready, closers);
            handles.insert(task_key, Arc::new(slot)).await;
            Ok(handle)
        });

        match joined(key, task).await {
            Ok(handle) => {
                tracing::info!(topic = %key, "Producer handle refreshed");
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(
                    topic = %key,
                    error = %e,
                    "Producer handle refresh failed, keeping current handle"
                );
                Err(e)
            }
        }
    }

    /// Remove `key` and close its handle.
    pub async fn invalidate(&self, key: &TopicKey) {
        self.handles.invalidate(key).await;
    }

    /// Remove every handle. Removal completes on the next maintenance pass.
    pub fn invalidate_all(&self) {
        self.handles.invalidate_all();
    }

    pub fn contains(&self, key: &TopicKey) -> bool {
        self.handles.contains_key(key)
    }

    /// Approximate number of cached slots, including constructions in flight;
    /// exact after `run_pending_tasks`.
    pub fn entry_count(&self) -> u64 {
        self.handles.entry_count()
    }

    /// Apply pending evictions now (idle expiry, size bound, invalidations).
    pub async fn run_pending_tasks(&self) {
        self.handles.run_pending_tasks().await;
        metrics::CACHED_HANDLES.set(self.handles.entry_count() as i64);
    }

    /// Wait until every scheduled `close()` has finished.
    ///
    /// Concurrent callers are served one at a time.
    pub async fn wait_for_closes(&self) {
        let _drain = self.drain.lock().await;
        self.closers.close();
        self.closers.wait().await;
        self.closers.reopen();
    }

    /// Start the background maintenance task.
    ///
    /// Runs pending evictions every `interval` so idle handles are closed even
    /// when no request touches the cache.
    pub fn start_maintenance(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                tracing::trace!("Handle cache maintenance tick");
                cache.run_pending_tasks().await;
            }
        })
    }

    /// Close every cached handle, including ones still under construction,
    /// and wait for the closes to finish. Later lookups fail.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::Release);
        let count = self.handles.entry_count();
        tracing::info!(handles = count, "Shutting down handle cache, closing all producers");

        self.invalidate_all();
        self.run_pending_tasks().await;

        // A refresh that passed the closing check may still install a slot
        self.builders.close();
        self.builders.wait().await;
        self.invalidate_all();
        self.run_pending_tasks().await;

        self.wait_for_closes().await;

        tracing::info!("Handle cache shutdown complete");
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Start building the handle for `key` on a task owned by the cache.
    fn spawn_construction(&self, key: TopicKey) -> Arc<HandleSlot> {
        let id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let factory = Arc::clone(&self.factory);
        let closing = Arc::clone(&self.closing);
        let handles = self.handles.clone();
        let task_key = key.clone();

        let task = self.builders.spawn(async move {
            let result = construct(factory, task_key.clone(), &closing)
                .await
                .map_err(Arc::new);
            if result.is_err() {
                remove_slot(&handles, &task_key, id).await;
            }
            result
        });

        let ready = joined(&key, task).boxed().shared();
        Arc::new(HandleSlot::new(id, key, ready, self.closers.clone()))
    }
}

/// Await a construction task, turning a panic into a construction error.
fn joined(
    key: &TopicKey,
    task: JoinHandle<HandleResult>,
) -> impl Future<Output = HandleResult> + Send + 'static {
    let key = key.clone();
    async move {
        match task.await {
            Ok(result) => result,
            Err(join_error) => Err(Arc::new(HandleError::Construction {
                topic: key,
                reason: format!("construction task failed: {}", join_error),
            })),
        }
    }
}

/// Remove the slot for `key` only if it is still the one identified by `id`.
async fn remove_slot(handles: &Cache<TopicKey, Arc<HandleSlot>>, key: &TopicKey, id: u64) {
    handles
        .entry(key.clone())
        .and_compute_with(|entry| {
            let op = match entry {
                Some(entry) if entry.value().id == id => Op::Remove,
                _ => Op::Nop,
            };
            future::ready(op)
        })
        .await;
}

/// Run the factory on the blocking pool.
async fn construct(
    factory: Arc<dyn HandleFactory>,
    key: TopicKey,
    closing: &AtomicBool,
) -> Result<Arc<dyn ProducerHandle>, HandleError> {
    tracing::debug!(topic = %key, "Creating producer handle");

    let task_key = key.clone();
    let created = match tokio::task::spawn_blocking(move || factory.create_handle(&task_key)).await
    {
        Ok(result) => result,
        Err(join_error) => Err(HandleError::Construction {
            topic: key.clone(),
            reason: format!("factory task failed: {}", join_error),
        }),
    };

    match created {
        Ok(handle) => {
            metrics::HANDLES_CREATED_TOTAL.inc();
            if closing.load(Ordering::Acquire) {
                tracing::info!(topic = %key, "Cache shut down during construction, closing new handle");
                close_handle(&key, handle.as_ref()).await;
                return Err(HandleError::Closed(key));
            }
            Ok(handle)
        }
        Err(e) => {
            metrics::HANDLE_CREATE_ERRORS_TOTAL.inc();
            tracing::error!(
                tenant = %key.tenant(),
                namespace = %key.namespace(),
                topic = %key.topic(),
                error = %e,
                "Failed to create producer handle"
            );
            Err(e)
        }
    }
}

fn cause_label(cause: RemovalCause) -> &'static str {
    match cause {
        RemovalCause::Expired => "expired",
        RemovalCause::Explicit => "explicit",
        RemovalCause::Replaced => "replaced",
        RemovalCause::Size => "size",
    }
}

/// Eviction listener. Must not block.
fn on_removal(key: &TopicKey, slot: &HandleSlot, cause: RemovalCause) {
    // Failed slots carry no handle
    if !slot.is_failed() {
        let cause = cause_label(cause);
        metrics::HANDLES_EVICTED_TOTAL
            .with_label_values(&[cause])
            .inc();
        tracing::info!(topic = %key, cause, "Producer handle removed from cache");
    }
    slot.release();
}

/// Close the handle behind `ready` on its own task once construction finishes.
fn schedule_close(closers: &TaskTracker, key: TopicKey, ready: SharedHandle) {
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            tracing::warn!(topic = %key, "No runtime to close evicted producer handle");
            return;
        }
    };

    closers.spawn_on(
        async move {
            if let Ok(handle) = ready.await {
                close_handle(&key, handle.as_ref()).await;
            }
        },
        &runtime,
    );
}

async fn close_handle(key: &TopicKey, handle: &dyn ProducerHandle) {
    if let Err(e) = handle.close().await {
        metrics::HANDLE_CLOSE_ERRORS_TOTAL.inc();
        tracing::error!(topic = %key, error = %e, "Failed to close producer handle");
    }
}
