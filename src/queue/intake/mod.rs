//! Event Intake: applies order lifecycle events to the queue.
//!
//! The order service publishes an event whenever an order changes status.
//! Delivery is at-least-once and may be out of order, so every handler is
//! idempotent on top of the coordinator:
//!
//! | `new_status` | Coordinator call | On failure |
//! |---|---|---|
//! | `confirmed` | `add_to_queue` | [`IntakeOutcome::Requeue`] (`Discard` for invalid ids) |
//! | `completed`, `cancelled` | `remove_from_queue` | [`IntakeOutcome::Ack`] |
//! | anything else | none | n/a, always `Ack` |
//!
//! Payloads that do not parse are [`IntakeOutcome::Discard`]ed.
//!
//! [`EventIntake::run`] is the transport-agnostic worker loop. It consumes
//! [`IntakeDelivery`] values from a channel, processes a bounded number of
//! them concurrently and settles each with its outcome. The `nats` feature
//! adds a JetStream transport feeding that loop.

mod delivery;
mod event;
#[cfg(feature = "nats")]
pub mod nats;

pub use delivery::{ChannelDelivery, IntakeDelivery, IntakeOutcome};
pub use event::{OrderAction, OrderEvent};

use super::config::IntakeConfig;
use super::config::DEFAULT_INTAKE_PREFETCH;
use super::coordinator::QueueCoordinator;
use super::error::QueueError;
use super::store::QueueStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Bridges lifecycle events into [`QueueCoordinator`] calls.
pub struct EventIntake<S> {
    coordinator: Arc<QueueCoordinator<S>>,
    max_in_flight: usize,

    received: AtomicU64,
    added: AtomicU64,
    removed: AtomicU64,
    ignored: AtomicU64,
    requeued: AtomicU64,
    discarded: AtomicU64,
}

impl<S> EventIntake<S>
where
    S: QueueStore,
{
    /// Creates an intake driving `coordinator`.
    pub fn new(coordinator: Arc<QueueCoordinator<S>>) -> Self {
        Self {
            coordinator,
            max_in_flight: DEFAULT_INTAKE_PREFETCH,
            received: AtomicU64::new(0),
            added: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Creates an intake using the prefetch from `config` as the in-flight limit.
    pub fn from_config(coordinator: Arc<QueueCoordinator<S>>, config: &IntakeConfig) -> Self {
        Self::new(coordinator).with_max_in_flight(config.prefetch)
    }

    /// Sets how many deliveries [`run`](Self::run) processes concurrently.
    /// Zero is raised to one.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// The coordinator this intake drives.
    pub fn coordinator(&self) -> &Arc<QueueCoordinator<S>> {
        &self.coordinator
    }

    /// Concurrency limit of [`run`](Self::run).
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Returns the number of payloads handled.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Returns the number of `confirmed` events that queued an order.
    #[must_use]
    pub fn added(&self) -> u64 {
        self.added.load(Ordering::Relaxed)
    }

    /// Returns the number of `completed`/`cancelled` events applied.
    #[must_use]
    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Returns the number of events acknowledged without effect.
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Returns the number of deliveries handed back for redelivery.
    #[must_use]
    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    /// Returns the number of poison messages dropped.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Parses and applies one raw message.
    pub async fn handle_payload(&self, payload: &[u8]) -> IntakeOutcome {
        self.received.fetch_add(1, Ordering::Relaxed);

        match OrderEvent::from_slice(payload) {
            Ok(event) => self.apply(&event).await,
            Err(err) => {
                error!(error = %err, bytes = payload.len(), "malformed order event, discarding");
                self.discarded.fetch_add(1, Ordering::Relaxed);
                IntakeOutcome::Discard
            }
        }
    }

    /// Applies an already parsed event.
    pub async fn handle_event(&self, event: &OrderEvent) -> IntakeOutcome {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.apply(event).await
    }

    async fn apply(&self, event: &OrderEvent) -> IntakeOutcome {
        let order_id = event.order_id;
        trace!(order_id, new_status = %event.new_status, "order event received");

        match event.action() {
            OrderAction::Enqueue => {
                match self.coordinator.add_to_queue(order_id, event.user_id).await {
                    Ok(entry) => {
                        debug!(order_id, queue_number = entry.queue_number, "order event queued order");
                        self.added.fetch_add(1, Ordering::Relaxed);
                        IntakeOutcome::Ack
                    }
                    Err(QueueError::InvalidInput { message }) => {
                        error!(order_id, user_id = event.user_id, %message, "confirmed event with invalid ids, discarding");
                        self.discarded.fetch_add(1, Ordering::Relaxed);
                        IntakeOutcome::Discard
                    }
                    Err(err) => {
                        warn!(order_id, error = %err, "failed to queue order, requeueing event");
                        self.requeued.fetch_add(1, Ordering::Relaxed);
                        IntakeOutcome::Requeue
                    }
                }
            }
            OrderAction::Dequeue => match self.coordinator.remove_from_queue(order_id).await {
                Ok(()) => {
                    debug!(order_id, new_status = %event.new_status, "order event removed order");
                    self.removed.fetch_add(1, Ordering::Relaxed);
                    IntakeOutcome::Ack
                }
                Err(err) => {
                    warn!(order_id, error = %err, "failed to remove order, acknowledging anyway");
                    self.ignored.fetch_add(1, Ordering::Relaxed);
                    IntakeOutcome::Ack
                }
            },
            OrderAction::Ignore => {
                trace!(order_id, new_status = %event.new_status, "order event ignored");
                self.ignored.fetch_add(1, Ordering::Relaxed);
                IntakeOutcome::Ack
            }
        }
    }

    /// Worker loop: processes deliveries until the channel closes or
    /// `shutdown` turns `true`.
    ///
    /// At most [`max_in_flight`](Self::max_in_flight) deliveries are processed
    /// at once. On shutdown the loop stops taking new deliveries, closes the
    /// channel and waits for in-flight ones to settle. Deliveries still
    /// buffered in the channel are dropped unsettled, leaving redelivery to
    /// the transport.
    pub async fn run<D>(
        self: Arc<Self>,
        mut deliveries: mpsc::Receiver<D>,
        mut shutdown: watch::Receiver<bool>,
    ) where
        D: IntakeDelivery,
    {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        info!(max_in_flight = self.max_in_flight, "event intake started");

        loop {
            while let Some(finished) = in_flight.try_join_next() {
                log_join_result(finished);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        debug!("delivery channel closed");
                        break;
                    }
                },
            };

            let intake = Arc::clone(&self);
            in_flight.spawn(async move {
                let outcome = intake.handle_payload(delivery.payload()).await;
                trace!(%outcome, "settling delivery");
                delivery.settle(outcome).await;
                drop(permit);
            });
        }

        deliveries.close();
        info!(in_flight = in_flight.len(), "event intake draining");
        while let Some(finished) = in_flight.join_next().await {
            log_join_result(finished);
        }
        info!(
            received = self.received(),
            added = self.added(),
            removed = self.removed(),
            requeued = self.requeued(),
            discarded = self.discarded(),
            "event intake stopped"
        );
    }
}

/// Resolves once `true` is observed. A dropped sender never resolves.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "intake task failed");
    }
}

impl<S> std::fmt::Debug for EventIntake<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIntake")
            .field("max_in_flight", &self.max_in_flight)
            .field("received", &self.received.load(Ordering::Relaxed))
            .field("added", &self.added.load(Ordering::Relaxed))
            .field("removed", &self.removed.load(Ordering::Relaxed))
            .field("ignored", &self.ignored.load(Ordering::Relaxed))
            .field("requeued", &self.requeued.load(Ordering::Relaxed))
            .field("discarded", &self.discarded.load(Ordering::Relaxed))
            .finish()
    }
}
