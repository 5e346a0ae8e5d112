//! Feedback router
//!
//! Publish/subscribe dispatch of [`FeedbackEvent`]s to downstream consumers
//! (audit, continual learning, trace files).
//!
//! Every subscription owns a bounded queue drained by its own worker task:
//!
//! - `publish` never blocks and never fails; a full queue drops the event for
//!   that subscriber only and counts the drop
//! - a handler error or panic is logged and counted, the worker keeps going
//! - successive events reach a given subscriber in publish order
//!
//! ```rust,ignore
//! let router = FeedbackRouter::new(256);
//! let handle = router.subscribe(
//!     EventFilter::kinds([FeedbackKind::Accepted]),
//!     handler_fn(|event| async move {
//!         println!("accepted {}", event.request_id);
//!         Ok(())
//!     }),
//! )?;
//! ```

mod log;
pub mod sinks;

pub use log::FeedbackLog;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use veritas_kernel::{FeedbackEvent, FeedbackKind};

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Subscribing needs a Tokio runtime to host the subscription's worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    #[error("cannot subscribe handler '{0}': no Tokio runtime is running")]
    NoRuntime(String),
}

/// Error type handlers may return; it is logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of feedback events.
#[async_trait]
pub trait FeedbackHandler: Send + Sync {
    fn name(&self) -> &str {
        "handler"
    }

    async fn handle(&self, event: &FeedbackEvent) -> Result<(), HandlerError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> FeedbackHandler for FnHandler<F>
where
    F: Fn(FeedbackEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn handle(&self, event: &FeedbackEvent) -> Result<(), HandlerError> {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as a [`FeedbackHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn FeedbackHandler>
where
    F: Fn(FeedbackEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

type Predicate = Arc<dyn Fn(&FeedbackEvent) -> bool + Send + Sync>;

/// Subscription predicate.
#[derive(Clone)]
pub enum EventFilter {
    All,
    Kinds(HashSet<FeedbackKind>),
    Request(String),
    Custom(Predicate),
}

impl EventFilter {
    pub fn all() -> Self {
        Self::All
    }

    pub fn kinds(kinds: impl IntoIterator<Item = FeedbackKind>) -> Self {
        Self::Kinds(kinds.into_iter().collect())
    }

    pub fn request(request_id: impl Into<String>) -> Self {
        Self::Request(request_id.into())
    }

    pub fn custom(f: impl Fn(&FeedbackEvent) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn matches(&self, event: &FeedbackEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.kind()),
            Self::Request(id) => event.request_id == *id,
            Self::Custom(f) => f(event),
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Kinds(k) => f.debug_tuple("Kinds").field(k).finish(),
            Self::Request(id) => f.debug_tuple("Request").field(id).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Delivery counters of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriberStats {
    /// Events the handler processed successfully.
    pub delivered: u64,
    /// Events whose handler returned an error or panicked.
    pub failed: u64,
    /// Events discarded because the queue was full.
    pub dropped: u64,
}

/// Returned by [`FeedbackRouter::subscribe`]; pass to `unsubscribe`.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    counters: Arc<Counters>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Counters stay readable after the subscription is gone.
    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

struct Subscriber {
    name: String,
    filter: EventFilter,
    tx: mpsc::Sender<Arc<FeedbackEvent>>,
    counters: Arc<Counters>,
}

struct RouterInner {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    workers: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Cheaply cloneable handle to a shared subscriber set.
#[derive(Clone)]
pub struct FeedbackRouter {
    inner: Arc<RouterInner>,
}

impl Default for FeedbackRouter {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl FeedbackRouter {
    pub fn new(subscriber_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                subscribers: RwLock::new(HashMap::new()),
                workers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: subscriber_capacity.max(1),
            }),
        }
    }

    /// Register `handler` for events matching `filter`.
    ///
    /// The subscription's worker is spawned on the current Tokio runtime;
    /// outside of one nothing is registered and [`SubscribeError::NoRuntime`]
    /// is returned.
    pub fn subscribe(
        &self,
        filter: EventFilter,
        handler: Arc<dyn FeedbackHandler>,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        let name = handler.name().to_string();
        let Ok(runtime) = Handle::try_current() else {
            return Err(SubscribeError::NoRuntime(name));
        };
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let counters = Arc::new(Counters::default());

        let worker = runtime.spawn(run_worker(id, handler, rx, counters.clone()));

        self.inner.subscribers.write().insert(
            id,
            Subscriber {
                name: name.clone(),
                filter,
                tx,
                counters: counters.clone(),
            },
        );
        self.inner.workers.lock().insert(id, worker);
        debug!(subscription = id, handler = %name, "Subscribed feedback handler");

        Ok(SubscriptionHandle { id, counters })
    }

    /// Remove a subscription. Events already queued are still delivered.
    /// Unknown or already-removed handles are ignored.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.inner.subscribers.write().remove(&handle.id).is_some();
        // Worker exits on its own once the sender is gone.
        self.inner.workers.lock().remove(&handle.id);
        if removed {
            debug!(subscription = handle.id, "Unsubscribed feedback handler");
        }
        removed
    }

    /// Queue `event` for every matching subscriber; returns how many accepted it.
    pub fn publish(&self, event: FeedbackEvent) -> usize {
        let event = Arc::new(event);
        let subscribers = self.inner.subscribers.read();
        let mut queued = 0;
        for (id, sub) in subscribers.iter() {
            if !sub.filter.matches(&event) {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    sub.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = id,
                        handler = %sub.name,
                        request_id = %event.request_id,
                        kind = %event.kind(),
                        "Subscriber queue full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscription = id, "Subscriber worker gone");
                }
            }
        }
        queued
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Close every subscription and wait for queued events to be handled.
    pub async fn shutdown(&self) {
        self.inner.subscribers.write().clear();
        let workers: Vec<JoinHandle<()>> =
            self.inner.workers.lock().drain().map(|(_, w)| w).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Feedback worker terminated abnormally");
            }
        }
    }
}

async fn run_worker(
    id: u64,
    handler: Arc<dyn FeedbackHandler>,
    mut rx: mpsc::Receiver<Arc<FeedbackEvent>>,
    counters: Arc<Counters>,
) {
    while let Some(event) = rx.recv().await {
        let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscription = id,
                    handler = handler.name(),
                    request_id = %event.request_id,
                    kind = %event.kind(),
                    error = %e,
                    "Feedback handler failed"
                );
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscription = id,
                    handler = handler.name(),
                    request_id = %event.request_id,
                    kind = %event.kind(),
                    "Feedback handler panicked"
                );
            }
        }
    }
}
