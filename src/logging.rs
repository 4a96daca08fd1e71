//! Logger collaborator.
//!
//! The runtime reports tick-loop faults and transitions through an injected
//! [`Logger`] instead of a global sink. [`TracingLogger`] forwards to the
//! `tracing` ecosystem and is the default; [`MemoryLogger`] keeps entries in
//! memory for hosts that want to inspect them.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::core::lock;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Sink for runtime diagnostics. Never consulted for control flow.
pub trait Logger: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Logger that forwards to `tracing` under the `tickwise` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!(target: "tickwise", "{message}"),
            Severity::Warning => tracing::warn!(target: "tickwise", "{message}"),
            Severity::Error => tracing::error!(target: "tickwise", "{message}"),
        }
    }
}

/// A single captured entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

/// Logger that keeps every entry in memory.
///
/// # Example
///
/// ```rust
/// use tickwise::logging::{Logger, MemoryLogger, Severity};
///
/// let logger = MemoryLogger::new();
/// logger.log(Severity::Warning, "low health");
///
/// assert_eq!(logger.count(Severity::Warning), 1);
/// assert!(logger.contains("health"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry logged so far, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.entries).clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    /// True if any entry's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.entries)
            .iter()
            .any(|entry| entry.message.contains(needle))
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl Logger for MemoryLogger {
    fn log(&self, severity: Severity, message: &str) {
        lock(&self.entries).push(LogEntry {
            severity,
            message: message.to_string(),
        });
    }
}
