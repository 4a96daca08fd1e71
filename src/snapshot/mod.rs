//! Diagnostic snapshots of a running state machine.
//!
//! A [`MachineSnapshot`] captures what a machine is doing right now: its
//! current state, how many tick loops are alive, and its recent transition
//! history. Snapshots are plain data and can be shipped to tooling as JSON
//! or as a compact binary blob.
//!
//! Snapshots describe a machine; they cannot restore one, because states
//! are live objects rather than data.

use crate::core::TransitionHistory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

/// Version identifier for snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable view of a state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: Uuid,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Name of the machine
    pub machine: String,

    /// When the machine was built
    pub created_at: DateTime<Utc>,

    /// Name of the current state, `None` when idle
    pub current_state: Option<String>,

    /// Tick loops alive when the snapshot was taken
    pub running_loops: usize,

    /// Recent transitions
    pub history: TransitionHistory,
}

impl MachineSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        snapshot.validated()
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = bincode::deserialize(bytes)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        snapshot.validated()
    }

    fn validated(self) -> Result<Self, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let (len, capacity) = (self.history.len(), self.history.capacity());
        if capacity == 0 || len > capacity {
            return Err(SnapshotError::InconsistentHistory { len, capacity });
        }
        Ok(self)
    }
}
