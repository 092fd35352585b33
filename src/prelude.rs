/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! This module provides a convenient way to import the most commonly used
//! types, traits, and functions from the orderqueue-rs crate. Instead of
//! importing each type individually, you can use:
//!
//! ```rust
//! use orderqueue_rs::prelude::*;
//! ```
//!
//! This will import all the essential types needed for working with the queue.

// Core queue types
pub use crate::queue::coordinator::{QueueCoordinator, StatusPolicy};
pub use crate::queue::entry::{OrderId, QueueEntry, QueueStats, QueueStatus, UserId};
pub use crate::queue::error::{QueueError, StoreError};

// Store types
pub use crate::queue::store::{EntryField, MemoryStore, PositionKey, QueueStore};
pub use crate::queue::store::{QueueSnapshot, QueueSnapshotPackage};

// Change notification types
pub use crate::queue::change_event::{QueueChangeEvent, QueueChangedListener};
pub use crate::queue::notifier::{ChangeNotifier, OverflowPolicy, Subscription};

// Event intake types
pub use crate::queue::intake::{
    ChannelDelivery, EventIntake, IntakeDelivery, IntakeOutcome, OrderAction, OrderEvent,
};
#[cfg(feature = "nats")]
pub use crate::queue::intake::nats::{IntakeError, NatsOrderEventConsumer, publish_order_event};

// Configuration
pub use crate::queue::config::{ConfigError, IntakeConfig, NotifierConfig, QueueConfig};

// Utility functions
pub use crate::utils::{current_time_millis, setup_logger};
