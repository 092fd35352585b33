//! Fan-out of queue change events to live observers.
//!
//! [`ChangeNotifier`] turns the coordinator's synchronous
//! [`QueueChangedListener`] callback into fire-and-forget delivery to any
//! number of observers. The listener only performs a `try_send` into a bounded
//! dispatch channel and returns immediately. A background Tokio task drains
//! that channel and forwards every event to each observer's own bounded
//! buffer, again with `try_send`, so a stalled observer can never back-pressure
//! the coordinator or its siblings.
//!
//! There is no replay: an observer only sees events dispatched after it
//! subscribed.
//!
//! # Example
//!
//! ```rust,no_run
//! use orderqueue_rs::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let notifier = ChangeNotifier::new(tokio::runtime::Handle::current())
//!     .with_observer_capacity(64);
//! let (notifier, listener) = notifier.into_listener();
//!
//! let store = Arc::new(MemoryStore::new());
//! let coordinator = QueueCoordinator::new(store).with_change_listener(listener);
//!
//! let mut subscription = notifier.subscribe();
//! coordinator.add_to_queue(1001, 5).await.ok();
//! if let Some(event) = subscription.recv().await {
//!     println!("{}", event.to_json().unwrap_or_default());
//! }
//! # }
//! ```

use super::change_event::{QueueChangeEvent, QueueChangedListener};
use super::config::NotifierConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Default capacity of the channel between the listener and the dispatch task.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 10_000;

/// Default outbound buffer of each observer.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// What to do with an observer whose buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the event for that observer only.
    #[default]
    DropNewest,
    /// Unregister the observer; its receiver sees the channel close once
    /// drained.
    Disconnect,
}

/// Handle held by one observer.
///
/// Dropping the subscription closes its channel and the notifier unregisters
/// it on the next dispatch.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<QueueChangeEvent>,
}

impl Subscription {
    /// Identifier accepted by [`ChangeNotifier::unsubscribe`].
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next event. Returns `None` once the observer has been
    /// unregistered and its buffer is drained.
    pub async fn recv(&mut self) -> Option<QueueChangeEvent> {
        self.receiver.recv().await
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<QueueChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Gives up the handle and returns the raw receiver.
    pub fn into_receiver(self) -> mpsc::Receiver<QueueChangeEvent> {
        self.receiver
    }
}

/// Broadcasts [`QueueChangeEvent`]s to subscribed observers.
///
/// # Metrics
///
/// - **events_received**: events handed to the listener callback
/// - **events_dispatched**: events fanned out by the dispatch task
/// - **deliveries**: events placed into an observer buffer
/// - **dropped_events**: events dropped because the dispatch channel was full
/// - **dropped_deliveries**: per-observer deliveries lost to a full buffer
/// - **disconnected_observers**: observers removed by
///   [`OverflowPolicy::Disconnect`]
pub struct ChangeNotifier {
    /// Handle to the Tokio runtime for spawning the dispatch task.
    runtime: tokio::runtime::Handle,

    /// Capacity of the dispatch channel.
    dispatch_capacity: usize,

    /// Outbound buffer size of each new observer.
    observer_capacity: usize,

    overflow_policy: OverflowPolicy,

    observers: DashMap<Uuid, mpsc::Sender<QueueChangeEvent>>,

    events_received: AtomicU64,
    events_dispatched: AtomicU64,
    deliveries: AtomicU64,
    dropped_events: AtomicU64,
    dropped_deliveries: AtomicU64,
    disconnected_observers: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a notifier that will spawn its dispatch task on `runtime`.
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            runtime,
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            observers: DashMap::new(),
            events_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            dropped_deliveries: AtomicU64::new(0),
            disconnected_observers: AtomicU64::new(0),
        }
    }

    /// Creates a notifier from configuration.
    pub fn from_config(runtime: tokio::runtime::Handle, config: &NotifierConfig) -> Self {
        Self::new(runtime)
            .with_dispatch_capacity(config.dispatch_capacity)
            .with_observer_capacity(config.observer_capacity)
            .with_overflow_policy(config.overflow_policy)
    }

    /// Sets the dispatch channel capacity. Zero is raised to one.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_dispatch_capacity(mut self, dispatch_capacity: usize) -> Self {
        self.dispatch_capacity = dispatch_capacity.max(1);
        self
    }

    /// Sets the outbound buffer of observers subscribing afterwards. Zero is
    /// raised to one.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_observer_capacity(mut self, observer_capacity: usize) -> Self {
        self.observer_capacity = observer_capacity.max(1);
        self
    }

    /// Sets the overflow policy.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_overflow_policy(mut self, overflow_policy: OverflowPolicy) -> Self {
        self.overflow_policy = overflow_policy;
        self
    }

    /// Registers a new observer.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, receiver) = mpsc::channel(self.observer_capacity);
        self.observers.insert(id, tx);
        debug!(observer = %id, "observer subscribed");
        Subscription { id, receiver }
    }

    /// Unregisters an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            debug!(observer = %id, "observer unsubscribed");
        }
        removed
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Active overflow policy.
    #[must_use]
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Returns the number of events handed to the listener callback.
    #[must_use]
    #[inline]
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Returns the number of events fanned out by the dispatch task.
    #[must_use]
    #[inline]
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    /// Returns the number of events placed into observer buffers.
    #[must_use]
    #[inline]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Returns the number of events dropped because the dispatch channel was full.
    #[must_use]
    #[inline]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Returns the number of per-observer deliveries lost to a full buffer.
    #[must_use]
    #[inline]
    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped_deliveries.load(Ordering::Relaxed)
    }

    /// Returns the number of observers removed for overflowing.
    #[must_use]
    #[inline]
    pub fn disconnected_observers(&self) -> u64 {
        self.disconnected_observers.load(Ordering::Relaxed)
    }

    /// Converts the notifier into a [`QueueChangedListener`].
    ///
    /// Consumes `self`, spawns the dispatch task on the configured runtime
    /// and returns the shared handle (for subscribing and metrics) together
    /// with the listener to install on the coordinator. The dispatch task
    /// exits once every clone of the listener has been dropped.
    pub fn into_listener(self) -> (Arc<Self>, QueueChangedListener) {
        let (tx, rx) = mpsc::channel::<QueueChangeEvent>(self.dispatch_capacity);
        let notifier = Arc::new(self);

        let dispatcher = Arc::clone(&notifier);
        notifier.runtime.spawn(Self::dispatch_task(dispatcher, rx));

        let listener_notifier = Arc::clone(&notifier);
        let listener = Arc::new(move |event: QueueChangeEvent| {
            listener_notifier
                .events_received
                .fetch_add(1, Ordering::Relaxed);
            if tx.try_send(event).is_err() {
                listener_notifier
                    .dropped_events
                    .fetch_add(1, Ordering::Relaxed);
                warn!("queue change channel full, event dropped");
            }
        });

        (notifier, listener)
    }

    async fn dispatch_task(notifier: Arc<Self>, mut rx: mpsc::Receiver<QueueChangeEvent>) {
        while let Some(event) = rx.recv().await {
            notifier.fan_out(&event);
        }
        debug!("queue change dispatch task stopped");
    }

    fn fan_out(&self, event: &QueueChangeEvent) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);

        // Removal happens after iteration; DashMap shards stay read-locked
        // while iterating.
        let mut stale: Vec<(Uuid, bool)> = Vec::new();
        for observer in self.observers.iter() {
            match observer.value().try_send(event.clone()) {
                Ok(()) => {
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                    match self.overflow_policy {
                        OverflowPolicy::DropNewest => {
                            trace!(observer = %observer.key(), kind = event.kind(), "observer buffer full, event dropped");
                        }
                        OverflowPolicy::Disconnect => stale.push((*observer.key(), true)),
                    }
                }
                Err(TrySendError::Closed(_)) => stale.push((*observer.key(), false)),
            }
        }

        for (id, overflowed) in stale {
            if self.observers.remove(&id).is_none() {
                continue;
            }
            if overflowed {
                self.disconnected_observers.fetch_add(1, Ordering::Relaxed);
                warn!(observer = %id, "observer buffer full, disconnecting");
            } else {
                debug!(observer = %id, "observer gone, unregistered");
            }
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("dispatch_capacity", &self.dispatch_capacity)
            .field("observer_capacity", &self.observer_capacity)
            .field("overflow_policy", &self.overflow_policy)
            .field("observers", &self.observers.len())
            .field("events_received", &self.events_received())
            .field("dropped_events", &self.dropped_events())
            .field("dropped_deliveries", &self.dropped_deliveries())
            .finish()
    }
}
