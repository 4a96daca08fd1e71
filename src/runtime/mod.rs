//! Async runtime for hierarchical states.
//!
//! - [`StateMachine`] owns the current state and the tick loops that drive it
//! - [`ParentState`] owns one active sub-state under a nested scope
//! - [`TransitionError`] reports hook failures on the transition path
//!
//! Hook faults raised from tick loops never reach the transition caller;
//! they are logged and stop only the channel they happened on.

mod error;
mod machine;
mod parent;

pub use error::TransitionError;
pub use machine::{StateMachine, WeakStateMachine};
pub use parent::ParentState;
