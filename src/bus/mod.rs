//! Ordered, durable, multi-subscriber event bus
//!
//! One FIFO queue, one dispatch loop. `publish` appends to the durable
//! journal (when configured) and flushes before the message is queued
//! for delivery, so a record that reached a subscriber has already
//! reached disk. Subscribers are invoked synchronously per message and
//! are isolated from each other: a panicking observer is logged and
//! delivery continues.
//!
//! The bus is an explicitly constructed, dependency-injected instance.
//! There is no global; tests build their own.

pub mod journal;
pub mod message;

pub use journal::{Journal, JournalError};
pub use message::{Message, MessageKind, Metadata, Scope};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Subscriber callback invoked for every dispatched message
pub type SubscriberFn = Arc<dyn Fn(&Message) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Errors raised by bus operations
#[derive(Debug, Error)]
pub enum BusError {
    /// The durable journal could not be written; the message was not
    /// enqueued (durability precedes delivery)
    #[error("event journal write failed: {0}")]
    Journal(#[from] JournalError),

    /// The dispatch queue is gone (bus dropped mid-publish)
    #[error("bus dispatch queue is closed")]
    Closed,
}

enum Dispatch {
    Deliver(Box<Message>),
    Stop,
}

/// Asynchronous pub/sub channel with an append-only durable log
pub struct EventBus {
    tx: mpsc::UnboundedSender<Dispatch>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
    subscribers: Arc<Mutex<Vec<(u64, SubscriberFn)>>>,
    next_subscription: AtomicU64,
    journal: Option<Mutex<Journal>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus without a durable journal
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscription: AtomicU64::new(0),
            journal: None,
            dispatcher: Mutex::new(None),
        }
    }

    /// Create a bus that journals every published message to `path`
    pub fn with_journal(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let journal = Journal::open(path)?;
        let mut bus = Self::new();
        bus.journal = Some(Mutex::new(journal));
        Ok(bus)
    }

    /// Publish a message: durable journal append first, then a
    /// non-blocking enqueue for dispatch
    pub fn publish(&self, message: Message) -> Result<(), BusError> {
        if let Some(journal) = &self.journal {
            lock(journal).append(&message)?;
        }
        self.tx
            .send(Dispatch::Deliver(Box::new(message)))
            .map_err(|_| BusError::Closed)
    }

    /// Register a subscriber callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscribers).push((id, Arc::new(callback)));
        SubscriptionId(id)
    }

    /// Remove a subscriber; messages dispatched afterwards no longer
    /// reach it
    pub fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subscribers).retain(|(sub_id, _)| *sub_id != id.0);
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Start the dispatch loop. Messages published before `start` are
    /// queued and delivered once it runs. Idempotent.
    pub fn start(&self) {
        let Some(rx) = lock(&self.rx).take() else {
            debug!("event bus dispatch loop already started");
            return;
        };
        let subscribers = self.subscribers.clone();
        let handle = tokio::spawn(dispatch_loop(rx, subscribers));
        *lock(&self.dispatcher) = Some(handle);
    }

    /// Stop the dispatch loop after draining messages published before
    /// the stop
    pub async fn stop(&self) {
        if self.tx.send(Dispatch::Stop).is_err() {
            return;
        }
        let handle = lock(&self.dispatcher).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("event bus dispatch loop join failed: {}", e);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    subscribers: Arc<Mutex<Vec<(u64, SubscriberFn)>>>,
) {
    while let Some(item) = rx.recv().await {
        let message = match item {
            Dispatch::Stop => break,
            Dispatch::Deliver(message) => message,
        };

        // snapshot so a subscriber can unsubscribe itself mid-delivery
        let current: Vec<SubscriberFn> =
            lock(&subscribers).iter().map(|(_, cb)| cb.clone()).collect();

        for callback in current {
            if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
                warn!(
                    "subscriber panicked on {:?} message from {}; continuing delivery",
                    message.kind, message.source
                );
            }
        }
    }
    debug!("event bus dispatch loop stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
