use crate::queue::entry::{OrderId, UserId};
use serde::{Deserialize, Serialize};

/// Order lifecycle message published by the order service.
///
/// Only `order_id` is mandatory on the wire. The remaining fields default when
/// absent so that a `completed` notice without a user still parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Free-form event name, e.g. `order.status_changed`.
    #[serde(default)]
    pub event_type: String,

    /// Order the event refers to.
    pub order_id: OrderId,

    /// Owner of the order.
    #[serde(default)]
    pub user_id: UserId,

    /// Status before the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,

    /// Status after the change. Drives the intake dispatch.
    #[serde(default)]
    pub new_status: String,

    /// Order total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,

    /// Queue number, if the sender already knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_number: Option<u64>,

    /// Ordered items, passed through untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<serde_json::Value>,

    /// Kitchen notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,

    /// Sender timestamp, kept as the raw string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// What the intake does with an [`OrderEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    /// `confirmed`: add the order to the queue.
    Enqueue,
    /// `completed` or `cancelled`: remove the order from the queue.
    Dequeue,
    /// Anything else.
    Ignore,
}

impl OrderEvent {
    /// Builds a minimal event for `order_id` moving to `new_status`.
    pub fn new(order_id: OrderId, user_id: UserId, new_status: impl Into<String>) -> Self {
        Self {
            event_type: "order.status_changed".to_string(),
            order_id,
            user_id,
            old_status: None,
            new_status: new_status.into(),
            total_amount: None,
            queue_number: None,
            items: Vec::new(),
            special_instructions: None,
            timestamp: None,
        }
    }

    /// Parses an event from a raw JSON payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Serializes the event to JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Dispatch decision keyed on `new_status`.
    pub fn action(&self) -> OrderAction {
        match self.new_status.as_str() {
            "confirmed" => OrderAction::Enqueue,
            "completed" | "cancelled" => OrderAction::Dequeue,
            _ => OrderAction::Ignore,
        }
    }

    /// Routing key the order service publishes this event under.
    pub fn routing_key(&self) -> String {
        format!("order.{}", self.new_status)
    }
}
