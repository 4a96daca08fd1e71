//! Tickwise: a hierarchical, cooperatively scheduled async state machine
//!
//! Tickwise drives game-style behaviour states from three independent tick
//! channels (ordinary, late and physics) under cooperative cancellation.
//! It does not own a clock or a thread pool: a host supplies a
//! [`Scheduler`](scheduler::Scheduler) and awaits transitions on its tokio
//! runtime.
//!
//! # Core Concepts
//!
//! - **State**: entry, exit and three tick hooks via the `State` trait
//! - **StateMachine**: cancel, drain, exit, enter, then resume ticking
//! - **ParentState**: one active `SubState` under a nested cancellation scope
//! - **CancellationScope**: cooperative lifetimes observed through tokens
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tickwise::async_trait;
//! use tickwise::core::{CancellationToken, State, StateError};
//! use tickwise::runtime::StateMachine;
//! use tickwise::scheduler::FrameScheduler;
//!
//! #[derive(Default)]
//! struct Wander {
//!     frames: AtomicUsize,
//! }
//!
//! #[async_trait]
//! impl State for Wander {
//!     async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
//!         token.check()?;
//!         self.frames.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let scheduler = Arc::new(FrameScheduler::new());
//! let machine = StateMachine::builder()
//!     .name("enemy")
//!     .scheduler(scheduler.clone())
//!     .build()
//!     .unwrap();
//!
//! let wander = Arc::new(Wander::default());
//! machine.go_to_state(wander.clone()).await.unwrap();
//!
//! // Let the tick loops start waiting, then fire one frame.
//! for _ in 0..4 {
//!     tokio::task::yield_now().await;
//! }
//! scheduler.tick();
//! for _ in 0..4 {
//!     tokio::task::yield_now().await;
//! }
//!
//! assert_eq!(wander.frames.load(Ordering::SeqCst), 1);
//! # });
//! ```

pub mod builder;
pub mod core;
pub mod logging;
pub mod runtime;
pub mod scheduler;
pub mod snapshot;

// Re-export commonly used types
pub use async_trait::async_trait;
pub use crate::builder::{BuildError, StateMachineBuilder};
pub use crate::core::{
    CancellationScope, CancellationToken, State, StateError, SubState, TickChannel, TransitionData,
};
pub use crate::runtime::{ParentState, StateMachine, TransitionError, WeakStateMachine};
