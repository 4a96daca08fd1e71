//! Transition history tracking.
//!
//! Every time a state machine installs a new current state (or goes idle)
//! it records a [`TransitionRecord`]. The history is bounded: once full,
//! the oldest records are dropped first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of records a machine keeps.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Record of a single installed transition.
///
/// `None` on either side stands for the idle machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Name of the outgoing state
    pub from: Option<String>,
    /// Name of the incoming state
    pub to: Option<String>,
    /// When the incoming state was installed
    pub timestamp: DateTime<Utc>,
    /// Whether the incoming state was entered with transition data
    pub with_data: bool,
}

impl TransitionRecord {
    pub fn new(from: Option<&str>, to: Option<&str>, with_data: bool) -> Self {
        Self {
            from: from.map(str::to_string),
            to: to.map(str::to_string),
            timestamp: Utc::now(),
            with_data,
        }
    }
}

/// Bounded, ordered history of transitions.
///
/// `record` returns a new history and leaves the original untouched.
///
/// # Example
///
/// ```rust
/// use tickwise::core::{TransitionHistory, TransitionRecord};
///
/// let history = TransitionHistory::with_capacity(2)
///     .record(TransitionRecord::new(None, Some("Wander"), false))
///     .record(TransitionRecord::new(Some("Wander"), Some("Attack"), false))
///     .record(TransitionRecord::new(Some("Attack"), Some("Wander"), true));
///
/// assert_eq!(history.len(), 2);
/// assert_eq!(history.get_path(), vec![Some("Wander"), Some("Attack"), Some("Wander")]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionHistory {
    capacity: usize,
    records: VecDeque<TransitionRecord>,
}

impl Default for TransitionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create an empty history that keeps at most `capacity` records.
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
        }
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, record: TransitionRecord) -> Self {
        let mut records = self.records.clone();
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        Self {
            capacity: self.capacity,
            records,
        }
    }

    /// Names of the states traversed: the `from` of the oldest retained
    /// record followed by the `to` of every record.
    pub fn get_path(&self) -> Vec<Option<&str>> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(first) = self.records.front() {
            path.push(first.from.as_deref());
        }
        path.extend(self.records.iter().map(|record| record.to.as_deref()));
        path
    }

    /// Time between the oldest and newest retained records.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.front()?, self.records.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn records(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
