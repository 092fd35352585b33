//! Queue and store error types

use super::entry::{OrderId, QueueStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`QueueStore`](crate::queue::store::QueueStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing store is unreachable or failed the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the failure
        message: String,
    },

    /// No record exists for the order.
    #[error("order {order_id} not found in store")]
    NotFound {
        /// The missing order
        order_id: OrderId,
    },

    /// The order is already a member of the ordered set.
    #[error("order {order_id} is already a queue member")]
    AlreadyMember {
        /// The duplicated order
        order_id: OrderId,
    },

    /// Snapshot data could not be encoded or decoded.
    #[error("snapshot serialization error: {message}")]
    Serialization {
        /// Underlying error message
        message: String,
    },

    /// Snapshot integrity check failed.
    #[error("snapshot checksum mismatch: expected {expected}, but computed {actual}")]
    ChecksumMismatch {
        /// Checksum carried by the package
        expected: String,
        /// Checksum computed from the payload
        actual: String,
    },

    /// Snapshot was written by an incompatible format version.
    #[error("unsupported snapshot version: {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the package
        found: u32,
        /// Version this build understands
        expected: u32,
    },

    /// Filesystem error while persisting or loading a snapshot.
    #[error("snapshot I/O error at {path:?}: {message}")]
    Io {
        /// Underlying error message
        message: String,
        /// File involved
        path: PathBuf,
    },
}

/// Errors surfaced by the [`QueueCoordinator`](crate::queue::coordinator::QueueCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The order has no active queue entry.
    #[error("queue entry not found: order {order_id}")]
    NotFound {
        /// The missing order
        order_id: OrderId,
    },

    /// The order is already queued and its existing entry could not be resolved.
    #[error("order {order_id} is already queued")]
    AlreadyQueued {
        /// The duplicated order
        order_id: OrderId,
    },

    /// Caller supplied an invalid identifier or payload.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem
        message: String,
    },

    /// The backing store is unreachable, erroring, or timed out.
    #[error("store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure
        message: String,
    },

    /// Status value is not one of `waiting`, `preparing`, `ready`, `completed`.
    #[error("invalid status: {status:?}")]
    InvalidStatus {
        /// The rejected value
        status: String,
    },

    /// The requested transition is not allowed by the strict status policy.
    #[error("invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        /// The order being updated
        order_id: OrderId,
        /// Current status
        from: QueueStatus,
        /// Requested status
        to: QueueStatus,
    },
}

impl QueueError {
    /// Returns `true` when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable { .. })
    }
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { order_id } => QueueError::NotFound { order_id },
            StoreError::AlreadyMember { order_id } => QueueError::AlreadyQueued { order_id },
            other => QueueError::StoreUnavailable {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        assert_eq!(
            QueueError::from(StoreError::NotFound { order_id: 3 }),
            QueueError::NotFound { order_id: 3 }
        );
        assert_eq!(
            QueueError::from(StoreError::AlreadyMember { order_id: 4 }),
            QueueError::AlreadyQueued { order_id: 4 }
        );
        let converted = QueueError::from(StoreError::Unavailable {
            message: "connection refused".to_string(),
        });
        assert!(converted.is_retryable());
        assert!(converted.to_string().contains("connection refused"));
    }

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(!QueueError::NotFound { order_id: 1 }.is_retryable());
        assert!(
            !QueueError::InvalidInput {
                message: "order_id must be positive".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_transition_error_display() {
        let err = QueueError::InvalidTransition {
            order_id: 9,
            from: QueueStatus::Completed,
            to: QueueStatus::Waiting,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition for order 9: completed -> waiting"
        );
    }
}
