//! Queue coordination: ordered store, coordinator, intake and notifier.

/// Queue change events and the listener type.
pub mod change_event;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
/// Consumes order lifecycle events and applies them to the queue.
pub mod intake;
/// Fire-and-forget fan-out of change events to observers.
pub mod notifier;
pub mod store;
mod tests;

pub use change_event::{QueueChangeEvent, QueueChangedListener};
pub use config::{ConfigError, IntakeConfig, NotifierConfig, QueueConfig};
pub use coordinator::{DEFAULT_STORE_TIMEOUT_MS, QueueCoordinator, StatusPolicy};
pub use entry::{
    DEFAULT_MINUTES_PER_ORDER, OrderId, QueueEntry, QueueStats, QueueStatus, UserId,
};
pub use error::{QueueError, StoreError};
pub use intake::{
    ChannelDelivery, EventIntake, IntakeDelivery, IntakeOutcome, OrderAction, OrderEvent,
};
#[cfg(feature = "nats")]
pub use intake::nats::{IntakeError, NatsDelivery, NatsOrderEventConsumer, publish_order_event};
pub use notifier::{ChangeNotifier, OverflowPolicy, Subscription};
pub use store::{
    EntryField, MemoryStore, PositionKey, QUEUE_SNAPSHOT_FORMAT_VERSION, QueueSnapshot,
    QueueSnapshotPackage, QueueStore,
};
