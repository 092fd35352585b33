/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 17/10/26
******************************************************************************/

//! Queue entry, status and aggregate statistics types.

use super::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Externally assigned order identifier. Must be positive.
pub type OrderId = u64;

/// Identifier of the customer that placed the order. Must be positive.
pub type UserId = u64;

/// Default number of minutes each order ahead in the queue adds to the
/// estimated wait.
pub const DEFAULT_MINUTES_PER_ORDER: u32 = 5;

/// Lifecycle status of a queued order.
///
/// The nominal progression is `waiting -> preparing -> ready -> completed`.
/// Whether that progression is enforced is decided by
/// [`StatusPolicy`](crate::queue::coordinator::StatusPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Accepted into the queue, not started yet.
    Waiting,
    /// Being prepared.
    Preparing,
    /// Ready for pickup.
    Ready,
    /// Picked up.
    Completed,
}

impl QueueStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [QueueStatus; 4] = [
        QueueStatus::Waiting,
        QueueStatus::Preparing,
        QueueStatus::Ready,
        QueueStatus::Completed,
    ];

    /// Lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Preparing => "preparing",
            QueueStatus::Ready => "ready",
            QueueStatus::Completed => "completed",
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            QueueStatus::Waiting => 0,
            QueueStatus::Preparing => 1,
            QueueStatus::Ready => 2,
            QueueStatus::Completed => 3,
        }
    }

    /// Returns `true` if `next` is this status or the single step after it.
    pub fn can_advance_to(&self, next: QueueStatus) -> bool {
        let (from, to) = (self.ordinal(), next.ordinal());
        to == from || to == from + 1
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(QueueStatus::Waiting),
            "preparing" => Ok(QueueStatus::Preparing),
            "ready" => Ok(QueueStatus::Ready),
            "completed" => Ok(QueueStatus::Completed),
            other => Err(QueueError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// One order's position record in the queue.
///
/// `estimated_wait_minutes` is never authoritative in storage: readers going
/// through the coordinator always get it recomputed from the current rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Order identifier, unique among active entries.
    pub order_id: OrderId,

    /// Owner of the order.
    pub user_id: UserId,

    /// Display sequence assigned once at insertion. Not an ordering key.
    pub queue_number: u64,

    /// Minutes until the order is expected to be served.
    #[serde(rename = "estimated_wait_time")]
    pub estimated_wait_minutes: u32,

    /// Current lifecycle status.
    pub status: QueueStatus,

    /// Insertion time in milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl QueueEntry {
    /// Builds a freshly queued entry in the `waiting` status.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        queue_number: u64,
        estimated_wait_minutes: u32,
        created_at: u64,
    ) -> Self {
        Self {
            order_id,
            user_id,
            queue_number,
            estimated_wait_minutes,
            status: QueueStatus::Waiting,
            created_at,
        }
    }

    /// Returns a copy with the estimate derived from `rank`.
    #[must_use]
    pub fn with_rank(mut self, rank: u64, minutes_per_order: u32) -> Self {
        self.estimated_wait_minutes = wait_minutes_for(rank, minutes_per_order);
        self
    }
}

/// Estimated wait for an entry with `rank` orders ahead of it.
#[inline]
pub fn wait_minutes_for(rank: u64, minutes_per_order: u32) -> u32 {
    let minutes = rank.saturating_mul(u64::from(minutes_per_order));
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Aggregate queue statistics, refreshed on every add and remove.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Orders accepted into the queue during the current UTC day.
    pub total_orders_today: u64,

    /// Average wait in minutes, derived from the active count.
    #[serde(rename = "average_wait_time")]
    pub average_wait_minutes: f64,

    /// Number of orders currently queued.
    pub active_orders_count: u64,
}

impl QueueStats {
    /// Derives the statistics for `active` queued orders.
    pub fn derive(active: u64, total_orders_today: u64, minutes_per_order: u32) -> Self {
        Self {
            total_orders_today,
            average_wait_minutes: active as f64 * f64::from(minutes_per_order),
            active_orders_count: active,
        }
    }
}
