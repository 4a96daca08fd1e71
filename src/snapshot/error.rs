//! Snapshot decoding errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not encode snapshot: {0}")]
    SerializationFailed(String),

    #[error("could not decode snapshot: {0}")]
    DeserializationFailed(String),

    #[error("snapshot format {found} is not supported (expected {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The decoded history holds more records than its own bound allows.
    #[error("snapshot history holds {len} records but its capacity is {capacity}")]
    InconsistentHistory { len: usize, capacity: usize },
}
