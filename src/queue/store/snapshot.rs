//! Checksummed snapshots of the Ordered Store

use super::PositionKey;
use crate::queue::entry::{QueueEntry, QueueStats};
use crate::queue::error::StoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Format version used for checksum-enabled queue snapshots.
pub const QUEUE_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One member of the ordered set together with its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Position of the member.
    pub key: PositionKey,
    /// The stored record.
    pub entry: QueueEntry,
}

/// A copy of the store state at a specific point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Timestamp when the snapshot was created (milliseconds since epoch)
    pub timestamp: u64,

    /// Last value handed out by the sequence counter
    pub sequence: u64,

    /// Members in ascending position order
    pub entries: Vec<SnapshotEntry>,

    /// Statistics snapshot at capture time
    pub stats: QueueStats,

    /// Per-day order counters as `(utc_day, count)` pairs
    pub daily_orders: Vec<(u64, u64)>,
}

impl QueueSnapshot {
    /// Number of members captured.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no member was captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wrapper that provides checksum validation for [`QueueSnapshot`] instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshotPackage {
    /// Version of the snapshot schema for forward compatibility.
    pub version: u32,
    /// Snapshot payload.
    pub snapshot: QueueSnapshot,
    /// Hex-encoded SHA-256 of the serialized snapshot.
    pub checksum: String,
}

impl QueueSnapshotPackage {
    /// Creates a new package computing the checksum of the snapshot contents.
    pub fn new(snapshot: QueueSnapshot) -> Result<Self, StoreError> {
        let checksum = Self::compute_checksum(&snapshot)?;

        Ok(Self {
            version: QUEUE_SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Serializes the package to JSON.
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|error| StoreError::Serialization {
            message: error.to_string(),
        })
    }

    /// Deserializes the package from JSON.
    pub fn from_json(data: &str) -> Result<Self, StoreError> {
        serde_json::from_str(data).map_err(|error| StoreError::Serialization {
            message: error.to_string(),
        })
    }

    /// Validates the checksum and version.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.version != QUEUE_SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: self.version,
                expected: QUEUE_SNAPSHOT_FORMAT_VERSION,
            });
        }

        let computed = Self::compute_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual: computed,
            });
        }

        Ok(())
    }

    /// Consumes the package and returns the validated snapshot.
    pub fn into_snapshot(self) -> Result<QueueSnapshot, StoreError> {
        self.validate()?;
        Ok(self.snapshot)
    }

    fn compute_checksum(snapshot: &QueueSnapshot) -> Result<String, StoreError> {
        let payload = serde_json::to_vec(snapshot).map_err(|error| StoreError::Serialization {
            message: error.to_string(),
        })?;

        let mut hasher = Sha256::new();
        hasher.update(payload);

        Ok(hex_encode(&hasher.finalize()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
