use super::entry::{OrderId, QueueEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event data for queue state changes.
///
/// Emitted by the coordinator after every successful mutation and serialized
/// for observers as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QueueChangeEvent {
    /// An order joined the queue. Carries the new entry.
    QueueUpdate(QueueEntry),

    /// An order's status changed. Carries the refreshed entry.
    StatusUpdate(QueueEntry),

    /// An order left the queue.
    QueueRemoved {
        /// The removed order
        order_id: OrderId,
    },
}

impl QueueChangeEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueChangeEvent::QueueUpdate(_) => "queue_update",
            QueueChangeEvent::StatusUpdate(_) => "status_update",
            QueueChangeEvent::QueueRemoved { .. } => "queue_removed",
        }
    }

    /// The order this event refers to.
    pub fn order_id(&self) -> OrderId {
        match self {
            QueueChangeEvent::QueueUpdate(entry) | QueueChangeEvent::StatusUpdate(entry) => {
                entry.order_id
            }
            QueueChangeEvent::QueueRemoved { order_id } => *order_id,
        }
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A thread-safe listener callback for queue change events.
///
/// The coordinator calls it synchronously after each successful mutation, so
/// implementations must return quickly and never block.
pub type QueueChangedListener = Arc<dyn Fn(QueueChangeEvent) + Send + Sync>;
