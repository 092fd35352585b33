//! Ordered Store: the single source of truth for queue state.
//!
//! A store keeps four logical pieces of state:
//!
//! - a monotonic sequence counter
//! - a position-ordered set of active order IDs, keyed by insertion score
//! - one record per active order
//! - an aggregate statistics snapshot (plus a per-day order counter)
//!
//! [`QueueStore`] is the seam between the coordinator and a backend. Every
//! method returns a `Send` future so a networked backend can be plugged in;
//! [`MemoryStore`] is the lock-free in-process implementation.
//!
//! # Consistency
//!
//! Individual operations are atomic. Sequences of operations are not: the
//! coordinator performs its multi-step writes with best-effort atomicity and
//! compensates a failed add by removing the member it wrote, identified by
//! its queue number, and retracting the daily count.
//!
//! The statistics snapshot is derived by the store itself from its live
//! membership, so concurrent refreshes can never leave an older count in
//! place of a newer one.

pub mod memory;
pub mod snapshot;

use super::entry::{OrderId, QueueEntry, QueueStats, QueueStatus};
use super::error::StoreError;
use serde::{Deserialize, Serialize};
use std::future::Future;

pub use memory::MemoryStore;
pub use snapshot::{QUEUE_SNAPSHOT_FORMAT_VERSION, QueueSnapshot, QueueSnapshotPackage};

/// Ordering key of a member in the position-ordered set.
///
/// Members are ordered by insertion score (seconds resolution). Equal scores
/// are broken by `sequence`, the strictly increasing queue number assigned at
/// insertion, so same-second inserts keep their insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Insertion timestamp in seconds since the Unix epoch.
    pub score_secs: u64,
    /// Tie-break: the entry's queue number.
    pub sequence: u64,
}

impl PositionKey {
    /// Creates a new position key.
    #[inline]
    pub fn new(score_secs: u64, sequence: u64) -> Self {
        Self {
            score_secs,
            sequence,
        }
    }
}

/// A single mutable field of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EntryField {
    /// Replace the lifecycle status.
    Status(QueueStatus),
}

/// Backend contract for the Ordered Store.
///
/// Implementations must be safe for concurrent use without caller-side
/// locking. `next_sequence` must be linearizable: no two callers may ever
/// observe the same value.
pub trait QueueStore: Send + Sync + 'static {
    /// Atomically increments the global counter and returns the new value.
    fn next_sequence(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Adds `order_id` to the ordered set at `key` and stores `record`.
    ///
    /// Fails with [`StoreError::AlreadyMember`] if the order is already a
    /// member; the existing score and record are left untouched.
    fn insert(
        &self,
        order_id: OrderId,
        key: PositionKey,
        record: QueueEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Zero-based position of `order_id` among current members.
    fn rank(&self, order_id: OrderId) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// All current members in ascending position order.
    fn members(&self) -> impl Future<Output = Result<Vec<OrderId>, StoreError>> + Send;

    /// Whether `order_id` is currently a member of the ordered set.
    fn contains(&self, order_id: OrderId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// The stored record for `order_id`.
    fn get(&self, order_id: OrderId)
    -> impl Future<Output = Result<QueueEntry, StoreError>> + Send;

    /// Overwrites a single field of the stored record.
    fn set_field(
        &self,
        order_id: OrderId,
        field: EntryField,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes `order_id` from the ordered set and the record store.
    ///
    /// Removing a non-member succeeds. Returns whether anything was removed.
    fn remove(&self, order_id: OrderId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes `order_id` only while its record still carries `queue_number`.
    ///
    /// Used to undo an insert without touching an entry written by another
    /// caller for the same order. Returns whether anything was removed.
    fn remove_if_queue_number(
        &self,
        order_id: OrderId,
        queue_number: u64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Number of current members.
    fn cardinality(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// The last written statistics snapshot.
    fn stats_snapshot(&self) -> impl Future<Output = Result<QueueStats, StoreError>> + Send;

    /// Recomputes the statistics snapshot from the current membership and
    /// the order counter of UTC day `day`, stores it and returns it.
    ///
    /// Refreshes must be serialized by the backend: the snapshot left behind
    /// always reflects state at least as new as the last completed mutation.
    fn refresh_stats(
        &self,
        day: u64,
        minutes_per_order: u32,
    ) -> impl Future<Output = Result<QueueStats, StoreError>> + Send;

    /// Increments the order counter of UTC day `day` and returns its new value.
    fn record_daily_order(&self, day: u64)
    -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Takes back one order counted for UTC day `day`, never going below
    /// zero. Returns the new value.
    fn retract_daily_order(&self, day: u64)
    -> impl Future<Output = Result<u64, StoreError>> + Send;
}
