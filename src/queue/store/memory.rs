//! In-process Ordered Store built from concurrent collections.

use super::snapshot::{QueueSnapshot, QueueSnapshotPackage, SnapshotEntry};
use super::{EntryField, PositionKey, QueueStore};
use crate::queue::entry::{OrderId, QueueEntry, QueueStats};
use crate::queue::error::StoreError;
use crate::utils::current_time_millis;
use crossbeam::atomic::AtomicCell;
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::{Future, ready};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, trace};

/// In-memory [`QueueStore`] built from concurrent collections.
///
/// - the sequence counter is an `AtomicU64`, so concurrent callers never
///   observe the same value
/// - the position-ordered set is a `SkipMap` keyed by [`PositionKey`], which
///   keeps members sorted by score and then by queue number
/// - `positions` maps each member to its key so rank and removal do not scan
/// - `records` holds the per-order entries
/// - the stats snapshot lives in an `AtomicCell` for O(1) reads; refreshes
///   are serialized by a `Mutex` and derive the snapshot from the live
///   member count, so the last refresh always wins with current data
///
/// Rank is computed by counting the members ahead of the key, which is
/// O(rank). Queues served by this crate are short enough that this is cheaper
/// than maintaining an order-statistics index under concurrent writes.
///
/// State can be made durable through [`MemoryStore::persist_to_path`] and
/// [`MemoryStore::load_from_path`], which use checksummed snapshots.
pub struct MemoryStore {
    counter: AtomicU64,
    ordered: SkipMap<PositionKey, OrderId>,
    positions: DashMap<OrderId, PositionKey>,
    records: DashMap<OrderId, QueueEntry>,
    stats: AtomicCell<QueueStats>,
    stats_refresh: Mutex<()>,
    daily_orders: DashMap<u64, u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            ordered: SkipMap::new(),
            positions: DashMap::new(),
            records: DashMap::new(),
            stats: AtomicCell::new(QueueStats::default()),
            stats_refresh: Mutex::new(()),
            daily_orders: DashMap::new(),
        }
    }

    /// Increments the sequence counter and returns the new value.
    pub fn next_sequence_value(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last value handed out by the sequence counter.
    pub fn current_sequence(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Inserts a member and its record.
    ///
    /// The record is written before the ordered-set member becomes visible,
    /// so a reader that finds the member can always resolve its record.
    pub fn insert_entry(
        &self,
        order_id: OrderId,
        key: PositionKey,
        record: QueueEntry,
    ) -> Result<(), StoreError> {
        match self.positions.entry(order_id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyMember { order_id }),
            Entry::Vacant(slot) => {
                self.records.insert(order_id, record);
                self.ordered.insert(key, order_id);
                slot.insert(key);
                trace!(order_id, ?key, "member inserted");
                Ok(())
            }
        }
    }

    /// Zero-based position of `order_id`.
    pub fn rank_of(&self, order_id: OrderId) -> Result<u64, StoreError> {
        let key = self
            .positions
            .get(&order_id)
            .map(|entry| *entry.value())
            .ok_or(StoreError::NotFound { order_id })?;
        Ok(self.ordered.range(..key).count() as u64)
    }

    /// Current members in ascending position order.
    pub fn member_ids(&self) -> Vec<OrderId> {
        self.ordered.iter().map(|entry| *entry.value()).collect()
    }

    /// Whether `order_id` is a member.
    pub fn is_member(&self, order_id: OrderId) -> bool {
        self.positions.contains_key(&order_id)
    }

    /// Clone of the stored record.
    pub fn record(&self, order_id: OrderId) -> Result<QueueEntry, StoreError> {
        self.records
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound { order_id })
    }

    /// Overwrites one field of the stored record.
    pub fn set_entry_field(&self, order_id: OrderId, field: EntryField) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound { order_id })?;
        match field {
            EntryField::Status(status) => record.status = status,
        }
        Ok(())
    }

    /// Removes a member and its record. Returns whether anything existed.
    pub fn remove_entry(&self, order_id: OrderId) -> bool {
        let key = self.positions.remove(&order_id).map(|(_, key)| key);
        if let Some(key) = key {
            self.ordered.remove(&key);
        }
        let had_record = self.records.remove(&order_id).is_some();
        key.is_some() || had_record
    }

    /// Removes a member only while its record carries `queue_number`.
    pub fn remove_entry_if(&self, order_id: OrderId, queue_number: u64) -> bool {
        let Some((_, key)) = self
            .positions
            .remove_if(&order_id, |_, key| key.sequence == queue_number)
        else {
            return false;
        };
        self.ordered.remove(&key);
        self.records
            .remove_if(&order_id, |_, record| record.queue_number == queue_number);
        trace!(order_id, queue_number, "member removed by queue number");
        true
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns `true` when the queue has no members.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Last written statistics.
    pub fn stats(&self) -> QueueStats {
        self.stats.load()
    }

    /// Replaces the statistics snapshot.
    pub fn store_stats(&self, stats: QueueStats) {
        let _guard = self
            .stats_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.stats.store(stats);
    }

    /// Derives the statistics from the live member count and the counter of
    /// `day`, then stores them.
    pub fn refresh_stats_for(&self, day: u64, minutes_per_order: u32) -> QueueStats {
        let _guard = self
            .stats_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stats = QueueStats::derive(self.len() as u64, self.daily_orders(day), minutes_per_order);
        self.stats.store(stats);
        stats
    }

    /// Counts one order for `day`, forgetting earlier days.
    pub fn count_daily_order(&self, day: u64) -> u64 {
        self.daily_orders.retain(|stored_day, _| *stored_day >= day);
        let mut count = self.daily_orders.entry(day).or_insert(0);
        *count += 1;
        *count
    }

    /// Takes back one order counted for `day`.
    pub fn uncount_daily_order(&self, day: u64) -> u64 {
        match self.daily_orders.get_mut(&day) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        }
    }

    /// Orders counted for `day`.
    pub fn daily_orders(&self, day: u64) -> u64 {
        self.daily_orders
            .get(&day)
            .map(|count| *count.value())
            .unwrap_or(0)
    }

    /// Captures a consistent-enough copy of the store.
    ///
    /// Members whose record is missing at capture time are skipped.
    pub fn snapshot(&self) -> QueueSnapshot {
        let entries = self
            .ordered
            .iter()
            .filter_map(|member| {
                let order_id = *member.value();
                self.records.get(&order_id).map(|record| SnapshotEntry {
                    key: *member.key(),
                    entry: record.value().clone(),
                })
            })
            .collect();

        let mut daily_orders: Vec<(u64, u64)> = self
            .daily_orders
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        daily_orders.sort_unstable();

        QueueSnapshot {
            timestamp: current_time_millis(),
            sequence: self.current_sequence(),
            entries,
            stats: self.stats(),
            daily_orders,
        }
    }

    /// Replaces the whole store content with `snapshot`.
    ///
    /// The sequence counter never moves backwards: it resumes from the larger
    /// of the snapshot counter and the highest restored queue number.
    pub fn restore_from_snapshot(&self, snapshot: QueueSnapshot) -> Result<(), StoreError> {
        self.clear();

        let mut highest = snapshot.sequence;
        for item in snapshot.entries {
            highest = highest.max(item.entry.queue_number);
            self.insert_entry(item.entry.order_id, item.key, item.entry)?;
        }
        for (day, count) in snapshot.daily_orders {
            self.daily_orders.insert(day, count);
        }
        self.stats.store(snapshot.stats);
        self.counter.store(highest, Ordering::SeqCst);

        debug!(members = self.len(), sequence = highest, "store restored from snapshot");
        Ok(())
    }

    /// Captures the store into a checksummed package.
    pub fn snapshot_package(&self) -> Result<QueueSnapshotPackage, StoreError> {
        QueueSnapshotPackage::new(self.snapshot())
    }

    /// Validates `package` and restores the store from it.
    pub fn restore_from_snapshot_package(
        &self,
        package: QueueSnapshotPackage,
    ) -> Result<(), StoreError> {
        let snapshot = package.into_snapshot()?;
        self.restore_from_snapshot(snapshot)
    }

    /// Writes a checksummed snapshot to `path`.
    ///
    /// The file is written next to the target and renamed into place, so a
    /// crash mid-write leaves the previous snapshot intact.
    pub fn persist_to_path(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = self.snapshot_package()?.to_json()?;
        let tmp_path = path.with_extension("tmp");

        std::fs::write(&tmp_path, json).map_err(|error| StoreError::Io {
            message: error.to_string(),
            path: tmp_path.clone(),
        })?;
        std::fs::rename(&tmp_path, path).map_err(|error| StoreError::Io {
            message: error.to_string(),
            path: path.to_path_buf(),
        })?;

        info!(path = %path.display(), members = self.len(), "queue snapshot persisted");
        Ok(())
    }

    /// Builds a store from a snapshot previously written by
    /// [`persist_to_path`](Self::persist_to_path).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|error| StoreError::Io {
            message: error.to_string(),
            path: path.to_path_buf(),
        })?;

        let store = Self::new();
        store.restore_from_snapshot_package(QueueSnapshotPackage::from_json(&data)?)?;
        info!(path = %path.display(), members = store.len(), "queue snapshot loaded");
        Ok(store)
    }

    fn clear(&self) {
        self.positions.clear();
        self.ordered.clear();
        self.records.clear();
        self.daily_orders.clear();
        self.stats.store(QueueStats::default());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for MemoryStore {
    fn next_sequence(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
        ready(Ok(self.next_sequence_value()))
    }

    fn insert(
        &self,
        order_id: OrderId,
        key: PositionKey,
        record: QueueEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        ready(self.insert_entry(order_id, key, record))
    }

    fn rank(&self, order_id: OrderId) -> impl Future<Output = Result<u64, StoreError>> + Send {
        ready(self.rank_of(order_id))
    }

    fn members(&self) -> impl Future<Output = Result<Vec<OrderId>, StoreError>> + Send {
        ready(Ok(self.member_ids()))
    }

    fn contains(&self, order_id: OrderId) -> impl Future<Output = Result<bool, StoreError>> + Send {
        ready(Ok(self.is_member(order_id)))
    }

    fn get(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<QueueEntry, StoreError>> + Send {
        ready(self.record(order_id))
    }

    fn set_field(
        &self,
        order_id: OrderId,
        field: EntryField,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        ready(self.set_entry_field(order_id, field))
    }

    fn remove(&self, order_id: OrderId) -> impl Future<Output = Result<bool, StoreError>> + Send {
        ready(Ok(self.remove_entry(order_id)))
    }

    fn remove_if_queue_number(
        &self,
        order_id: OrderId,
        queue_number: u64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        ready(Ok(self.remove_entry_if(order_id, queue_number)))
    }

    fn cardinality(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
        ready(Ok(self.len() as u64))
    }

    fn stats_snapshot(&self) -> impl Future<Output = Result<QueueStats, StoreError>> + Send {
        ready(Ok(self.stats()))
    }

    fn refresh_stats(
        &self,
        day: u64,
        minutes_per_order: u32,
    ) -> impl Future<Output = Result<QueueStats, StoreError>> + Send {
        ready(Ok(self.refresh_stats_for(day, minutes_per_order)))
    }

    fn record_daily_order(
        &self,
        day: u64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        ready(Ok(self.count_daily_order(day)))
    }

    fn retract_daily_order(
        &self,
        day: u64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        ready(Ok(self.uncount_daily_order(day)))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("sequence", &self.current_sequence())
            .field("members", &self.ordered.len())
            .field("records", &self.records.len())
            .field("stats", &self.stats.load())
            .finish()
    }
}
