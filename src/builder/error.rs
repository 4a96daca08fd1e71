//! Build errors for machines and drivers.

use thiserror::Error;

/// Errors that can occur when building a state machine or its driver.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Scheduler not specified. Call .scheduler(scheduler) before .build()")]
    MissingScheduler,

    #[error("Machine name must not be empty")]
    EmptyName,

    #[error("History capacity must be at least 1")]
    ZeroHistoryCapacity,

    #[error("Rate '{field}' must be greater than zero")]
    ZeroRate { field: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
