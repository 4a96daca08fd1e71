//! Builder API for state machine construction.
//!
//! [`StateMachineBuilder`] validates the collaborators a machine needs
//! before handing out a [`StateMachine`](crate::runtime::StateMachine).

pub mod error;
pub mod machine;

pub use error::BuildError;
pub use machine::StateMachineBuilder;
