//! Transition errors.

use crate::core::StateError;
use thiserror::Error;

/// Errors surfaced to the caller of a transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("state '{state}' failed to enter: {source}")]
    EnterFailed { state: String, source: StateError },

    #[error("state '{state}' failed to exit: {source}")]
    ExitFailed { state: String, source: StateError },

    #[error("parent state '{parent}' has not been entered")]
    ParentNotEntered { parent: String },
}

impl TransitionError {
    /// True when the failing hook stopped because its lifetime was
    /// cancelled, typically by a newer transition.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::EnterFailed { source, .. } | Self::ExitFailed { source, .. } => {
                source.is_cancelled()
            }
            Self::ParentNotEntered { .. } => false,
        }
    }

    /// Name of the state whose hook failed.
    pub fn state(&self) -> &str {
        match self {
            Self::EnterFailed { state, .. } | Self::ExitFailed { state, .. } => state,
            Self::ParentNotEntered { parent } => parent,
        }
    }
}
