//! # Concurrent Service Queue Coordinator
//!
//! A thread-safe, first-come-first-served queue coordinator written in Rust. It tracks live orders waiting for service, assigns each one a globally unique queue number, derives wait-time estimates from queue position, keeps aggregate statistics, consumes an at-least-once stream of order lifecycle events and pushes change notifications to live observers.
//!
//! ## Key Features
//!
//! - **Lock-Free Ordered Store**: [`MemoryStore`] keeps the position-ordered set in a `crossbeam_skiplist::SkipMap`, records in `dashmap::DashMap`, the sequence counter in an `AtomicU64` and the statistics snapshot in an `AtomicCell`, refreshed from the live member count under a short mutex. Queue numbers are unique under any amount of concurrent adds without application-level locking.
//!
//! - **Pluggable Backends**: the [`QueueStore`] trait returns `Send` futures, so a networked store can replace the in-memory one without touching the coordinator.
//!
//! - **Bounded Store Calls**: every store call made by the [`QueueCoordinator`] is gated by a timeout and surfaces as [`QueueError::StoreUnavailable`] instead of hanging a caller.
//!
//! - **Idempotent Event Intake**: [`EventIntake`] maps `confirmed`, `completed` and `cancelled` events onto coordinator calls and settles each delivery as ack, requeue or discard, so redelivered or out-of-order events are harmless. With the `nats` feature a JetStream durable consumer feeds it.
//!
//! - **Back-Pressure Free Notifications**: [`ChangeNotifier`] fans every change out to per-observer bounded buffers. A slow observer loses events (or is disconnected) but never slows a mutation down.
//!
//! - **Checksummed Snapshots**: the in-memory store can be persisted to and restored from a versioned JSON package guarded by a SHA-256 checksum.
//!
//! ## Wait-Time Model
//!
//! An entry's estimate is `rank * minutes_per_order`, where `rank` is its zero-based position among active entries and `minutes_per_order` defaults to 5. Estimates are recomputed on every read, so they shrink as orders ahead leave the queue. The statistics snapshot reports `active * minutes_per_order` as the average wait.
//!
//! ## Quick Start
//!
//! ```rust
//! use orderqueue_rs::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), QueueError> {
//! let coordinator = QueueCoordinator::new(Arc::new(MemoryStore::new()));
//!
//! let first = coordinator.add_to_queue(1001, 5).await?;
//! let second = coordinator.add_to_queue(1002, 6).await?;
//! assert_eq!(first.queue_number, 1);
//! assert_eq!(second.estimated_wait_minutes, 5);
//!
//! coordinator.update_status(1001, "preparing").await?;
//! coordinator.remove_from_queue(1001).await?;
//!
//! let remaining = coordinator.get_active_queue().await?;
//! assert_eq!(remaining.len(), 1);
//! assert_eq!(remaining[0].estimated_wait_minutes, 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! Queue number uniqueness is the only strict serialization point. Other coordinator operations are read-modify-write sequences against the store without a coordinator-level transaction: concurrent mutations of the same order resolve as last write wins.
//!
//! ## Configuration
//!
//! [`QueueConfig::from_env`] reads `QUEUE_MINUTES_PER_ORDER`, `QUEUE_STORE_TIMEOUT_MS`, `QUEUE_STATUS_POLICY`, `QUEUE_DISPATCH_BUFFER`, `QUEUE_OBSERVER_BUFFER`, `QUEUE_OVERFLOW_POLICY`, `QUEUE_INTAKE_PREFETCH`, `NATS_URL` and `QUEUE_SNAPSHOT_PATH`. The event intake is disabled unless `NATS_URL` is set. Logging goes through `tracing`; [`setup_logger`] installs a subscriber whose level comes from `LOGLEVEL`.
//!
//! ## Status
//! This project is currently in active development and is not yet suitable for production use.

pub mod queue;

pub mod prelude;
mod utils;

#[cfg(feature = "nats")]
pub use queue::{IntakeError, NatsDelivery, NatsOrderEventConsumer, publish_order_event};
pub use queue::{
    ChangeNotifier, ChannelDelivery, ConfigError, EventIntake, IntakeConfig, IntakeDelivery,
    IntakeOutcome, MemoryStore, NotifierConfig, OrderEvent, OverflowPolicy, PositionKey,
    QueueChangeEvent, QueueChangedListener, QueueConfig, QueueCoordinator, QueueEntry,
    QueueError, QueueSnapshot, QueueSnapshotPackage, QueueStats, QueueStatus, QueueStore,
    StatusPolicy, StoreError, Subscription,
};
pub use queue::{OrderId, UserId};
pub use utils::{current_time_millis, current_time_secs, current_utc_day, setup_logger};
