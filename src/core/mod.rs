//! Core building blocks of the runtime.
//!
//! This module contains the pieces every machine is made of:
//! - Cancellation scopes and tokens for cooperative lifetimes
//! - The `State` and `SubState` hook traits
//! - Bounded transition history

mod cancellation;
mod history;
mod state;

pub use cancellation::{CancellationScope, CancellationToken, Cancelled};
pub use history::{TransitionHistory, TransitionRecord, DEFAULT_HISTORY_CAPACITY};
pub use state::{state_name, State, StateError, SubState, TickChannel, TransitionData};

pub(crate) use state::{same_object, tick_state, tick_sub_state};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
