//! Queue Coordinator: business rules over the Ordered Store.
//!
//! The coordinator never caches queue state between calls; every operation
//! reads and writes through its [`QueueStore`]. Each store call is gated by a
//! timeout so a stalled backend surfaces as
//! [`QueueError::StoreUnavailable`] instead of blocking callers such as the
//! event intake acknowledgement path.
//!
//! # Consistency
//!
//! `queue_number` uniqueness is delegated to the store's atomic counter.
//! Everything else is read-modify-write without a coordinator-level
//! transaction: concurrent mutations of the *same* order resolve as last write
//! wins.

use super::change_event::{QueueChangeEvent, QueueChangedListener};
use super::config::QueueConfig;
use super::entry::{
    DEFAULT_MINUTES_PER_ORDER, OrderId, QueueEntry, QueueStats, QueueStatus, UserId,
    wait_minutes_for,
};
use super::error::{QueueError, StoreError};
use super::store::{EntryField, PositionKey, QueueStore};
use crate::utils::{current_time_millis, current_utc_day, utc_day_of};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Default upper bound for a single store call.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

/// How status updates are validated.
///
/// Status values are always checked against the four lifecycle states. The
/// policy only decides whether the transition itself is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Any valid status may follow any other.
    #[default]
    Permissive,
    /// Only `waiting -> preparing -> ready -> completed`, one step at a time.
    /// Re-applying the current status is allowed.
    Strict,
}

/// Coordinates queue membership, ordering, estimates and statistics.
pub struct QueueCoordinator<S> {
    store: Arc<S>,
    minutes_per_order: u32,
    store_timeout: Duration,
    status_policy: StatusPolicy,
    change_listener: Option<QueueChangedListener>,
}

impl<S> QueueCoordinator<S>
where
    S: QueueStore,
{
    /// Creates a coordinator over `store` with default settings.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            minutes_per_order: DEFAULT_MINUTES_PER_ORDER,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            status_policy: StatusPolicy::default(),
            change_listener: None,
        }
    }

    /// Creates a coordinator configured from `config`.
    pub fn from_config(store: Arc<S>, config: &QueueConfig) -> Self {
        Self::new(store)
            .with_minutes_per_order(config.minutes_per_order)
            .with_store_timeout(Duration::from_millis(config.store_timeout_ms))
            .with_status_policy(config.status_policy)
    }

    /// Sets the minutes each order ahead adds to the estimate.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_minutes_per_order(mut self, minutes_per_order: u32) -> Self {
        self.minutes_per_order = minutes_per_order;
        self
    }

    /// Sets the upper bound for each store call.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Sets the status transition policy.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_status_policy(mut self, status_policy: StatusPolicy) -> Self {
        self.status_policy = status_policy;
        self
    }

    /// Registers the listener notified after every successful mutation.
    #[must_use = "builders do nothing unless consumed"]
    pub fn with_change_listener(mut self, listener: QueueChangedListener) -> Self {
        self.change_listener = Some(listener);
        self
    }

    /// Replaces the change listener.
    pub fn set_change_listener(&mut self, listener: Option<QueueChangedListener>) {
        self.change_listener = listener;
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Minutes each order ahead adds to the estimate.
    pub fn minutes_per_order(&self) -> u32 {
        self.minutes_per_order
    }

    /// Active status policy.
    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// Adds an order to the back of the queue.
    ///
    /// Re-adding an order that is already queued is a no-op: the existing
    /// entry is returned with a fresh estimate, no queue number is consumed
    /// and no notification is emitted.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidInput`] if either identifier is zero
    /// - [`QueueError::StoreUnavailable`] if any store step fails; an entry
    ///   that was already inserted is removed again on a best-effort basis
    /// - [`QueueError::AlreadyQueued`] if a concurrent add won the insert and
    ///   the winning entry vanished before it could be read
    pub async fn add_to_queue(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<QueueEntry, QueueError> {
        validate_id(order_id, "order_id")?;
        validate_id(user_id, "user_id")?;

        if self.call("contains", self.store.contains(order_id)).await? {
            debug!(order_id, "order already queued, returning existing entry");
            return self.existing_entry(order_id).await;
        }

        let queue_number = self.call("next_sequence", self.store.next_sequence()).await?;
        let ahead = self.call("cardinality", self.store.cardinality()).await?;

        let created_at = current_time_millis();
        let score_secs = created_at / 1_000;
        let entry = QueueEntry::new(
            order_id,
            user_id,
            queue_number,
            wait_minutes_for(ahead, self.minutes_per_order),
            created_at,
        );
        let key = PositionKey::new(score_secs, queue_number);

        match self
            .call("insert", self.store.insert(order_id, key, entry.clone()))
            .await
        {
            Ok(()) => {}
            Err(QueueError::AlreadyQueued { .. }) => {
                debug!(order_id, queue_number, "lost concurrent add, returning winner");
                return self.existing_entry(order_id).await;
            }
            Err(err) => {
                self.compensate_insert(order_id, queue_number).await;
                return Err(err);
            }
        }

        let day = utc_day_of(score_secs);
        if let Err(err) = self
            .call("record_daily_order", self.store.record_daily_order(day))
            .await
        {
            warn!(order_id, error = %err, "queue add failed after insert, rolling back");
            self.compensate_insert(order_id, queue_number).await;
            return Err(err);
        }
        if let Err(err) = self.refresh_stats(day).await {
            warn!(order_id, error = %err, "queue add failed after insert, rolling back");
            self.compensate_insert(order_id, queue_number).await;
            self.compensate_daily_order(order_id, day).await;
            return Err(err);
        }

        info!(
            order_id,
            user_id,
            queue_number,
            estimated_wait = entry.estimated_wait_minutes,
            "order added to queue"
        );
        self.emit(QueueChangeEvent::QueueUpdate(entry.clone()));
        Ok(entry)
    }

    /// Fetches one entry with its estimate derived from the current rank.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotFound`] if the order is not queued.
    pub async fn get_queue_item(&self, order_id: OrderId) -> Result<QueueEntry, QueueError> {
        let entry = self.call("get", self.store.get(order_id)).await?;
        let rank = self.call("rank", self.store.rank(order_id)).await?;
        Ok(entry.with_rank(rank, self.minutes_per_order))
    }

    /// All queued entries in position order, each with a current estimate.
    ///
    /// Members whose record cannot be read are skipped rather than failing
    /// the whole listing; the remaining entries keep the rank they hold in
    /// the ordered set.
    ///
    /// # Errors
    ///
    /// [`QueueError::StoreUnavailable`] if the membership itself cannot be
    /// read.
    pub async fn get_active_queue(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let members = self.call("members", self.store.members()).await?;
        let mut entries = Vec::with_capacity(members.len());

        for (rank, order_id) in members.into_iter().enumerate() {
            match self.call("get", self.store.get(order_id)).await {
                Ok(entry) => entries.push(entry.with_rank(rank as u64, self.minutes_per_order)),
                Err(err) => {
                    debug!(order_id, error = %err, "skipping queue member without readable record");
                }
            }
        }

        trace!(count = entries.len(), "active queue listed");
        Ok(entries)
    }

    /// Changes the status of a queued order from a caller-supplied string.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidStatus`] if `status` is not a lifecycle state
    /// - see [`update_status_to`](Self::update_status_to)
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: &str,
    ) -> Result<QueueEntry, QueueError> {
        let status: QueueStatus = status.parse()?;
        self.update_status_to(order_id, status).await
    }

    /// Changes the status of a queued order.
    ///
    /// Only the status field is written; ordering and queue number are never
    /// touched. Returns the refreshed entry.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidInput`] if `order_id` is zero
    /// - [`QueueError::NotFound`] if the order is not queued
    /// - [`QueueError::InvalidTransition`] under [`StatusPolicy::Strict`]
    pub async fn update_status_to(
        &self,
        order_id: OrderId,
        status: QueueStatus,
    ) -> Result<QueueEntry, QueueError> {
        validate_id(order_id, "order_id")?;

        let current = self.call("get", self.store.get(order_id)).await?;
        if self.status_policy == StatusPolicy::Strict && !current.status.can_advance_to(status) {
            return Err(QueueError::InvalidTransition {
                order_id,
                from: current.status,
                to: status,
            });
        }

        self.call(
            "set_field",
            self.store.set_field(order_id, EntryField::Status(status)),
        )
        .await?;
        let refreshed = self.get_queue_item(order_id).await?;

        info!(order_id, from = %current.status, to = %status, "queue status updated");
        self.emit(QueueChangeEvent::StatusUpdate(refreshed.clone()));
        Ok(refreshed)
    }

    /// Removes an order from the queue regardless of its status.
    ///
    /// Removing an order that is not queued succeeds without emitting a
    /// notification.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidInput`] if `order_id` is zero
    /// - [`QueueError::StoreUnavailable`] if the store fails
    pub async fn remove_from_queue(&self, order_id: OrderId) -> Result<(), QueueError> {
        validate_id(order_id, "order_id")?;

        let removed = self.call("remove", self.store.remove(order_id)).await?;
        self.refresh_stats(current_utc_day()).await?;

        if removed {
            info!(order_id, "order removed from queue");
            self.emit(QueueChangeEvent::QueueRemoved { order_id });
        } else {
            debug!(order_id, "remove requested for order that is not queued");
        }
        Ok(())
    }

    /// The statistics snapshot written by the last add or remove.
    ///
    /// This is an O(1) read and is not recomputed from membership.
    pub async fn get_queue_stats(&self) -> Result<QueueStats, QueueError> {
        self.call("stats_snapshot", self.store.stats_snapshot())
            .await
    }

    async fn existing_entry(&self, order_id: OrderId) -> Result<QueueEntry, QueueError> {
        match self.get_queue_item(order_id).await {
            Err(QueueError::NotFound { .. }) => Err(QueueError::AlreadyQueued { order_id }),
            other => other,
        }
    }

    async fn refresh_stats(&self, day: u64) -> Result<QueueStats, QueueError> {
        let stats = self
            .call(
                "refresh_stats",
                self.store.refresh_stats(day, self.minutes_per_order),
            )
            .await?;
        trace!(?stats, "queue stats refreshed");
        Ok(stats)
    }

    /// Undoes this call's insert only. An entry for the same order written by
    /// a concurrent add carries a different queue number and is left alone.
    async fn compensate_insert(&self, order_id: OrderId, queue_number: u64) {
        match self
            .call(
                "remove_if_queue_number",
                self.store.remove_if_queue_number(order_id, queue_number),
            )
            .await
        {
            Ok(true) => debug!(order_id, queue_number, "partial queue insert rolled back"),
            Ok(false) => debug!(order_id, queue_number, "nothing of this insert left to roll back"),
            Err(err) => {
                error!(order_id, queue_number, error = %err, "failed to roll back partial queue insert")
            }
        }
    }

    async fn compensate_daily_order(&self, order_id: OrderId, day: u64) {
        if let Err(err) = self
            .call("retract_daily_order", self.store.retract_daily_order(day))
            .await
        {
            error!(order_id, day, error = %err, "failed to retract daily order count");
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, QueueError> {
        match tokio::time::timeout(self.store_timeout, request).await {
            Ok(result) => result.map_err(QueueError::from),
            Err(_) => {
                let timeout_ms = self.store_timeout.as_millis() as u64;
                warn!(operation, timeout_ms, "store call timed out");
                Err(QueueError::StoreUnavailable {
                    message: format!("{operation} timed out after {timeout_ms} ms"),
                })
            }
        }
    }

    fn emit(&self, event: QueueChangeEvent) {
        if let Some(listener) = &self.change_listener {
            listener(event);
        }
    }
}

fn validate_id(value: u64, field: &str) -> Result<(), QueueError> {
    if value == 0 {
        return Err(QueueError::InvalidInput {
            message: format!("{field} must be a positive integer"),
        });
    }
    Ok(())
}

impl<S> std::fmt::Debug for QueueCoordinator<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueCoordinator")
            .field("store", &self.store)
            .field("minutes_per_order", &self.minutes_per_order)
            .field("store_timeout", &self.store_timeout)
            .field("status_policy", &self.status_policy)
            .field("has_change_listener", &self.change_listener.is_some())
            .finish()
    }
}
