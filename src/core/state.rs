//! State and sub-state hooks.
//!
//! A state is a unit of behaviour driven by a [`StateMachine`]: one entry
//! hook (with or without transition data), three periodic tick hooks, and
//! one exit hook. Every hook completes immediately by default, so concrete
//! states override only what they need.
//!
//! Hooks take `&self`; states that keep mutable data use interior
//! mutability because the machine shares them with its tick loops.
//!
//! [`StateMachine`]: crate::runtime::StateMachine

use crate::core::cancellation::{CancellationToken, Cancelled};
use crate::runtime::TransitionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Payload handed to [`State::enter_with_data`]. Receivers downcast it.
pub type TransitionData = Box<dyn Any + Send>;

/// One of the three independent scheduling cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickChannel {
    /// Once per main frame.
    Update,
    /// Once per frame, after every ordinary tick of that frame.
    LateUpdate,
    /// Once per fixed physics step.
    FixedUpdate,
}

impl TickChannel {
    pub const ALL: [TickChannel; 3] = [
        TickChannel::Update,
        TickChannel::LateUpdate,
        TickChannel::FixedUpdate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::LateUpdate => "late-update",
            Self::FixedUpdate => "fixed-update",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Update => 0,
            Self::LateUpdate => 1,
            Self::FixedUpdate => 2,
        }
    }
}

/// Errors raised from state hooks.
#[derive(Debug, Error)]
pub enum StateError {
    /// The hook observed cancellation and stopped. Never reported as a fault.
    #[error("operation was cancelled")]
    Cancelled,

    #[error("{0}")]
    Fault(String),

    /// A transition requested from inside a hook failed.
    #[error(transparent)]
    Transition(Box<TransitionError>),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StateError {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    /// True when this error is the cooperative stop signal, including a
    /// nested transition whose entry was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Transition(err) => err.is_cancelled(),
            _ => false,
        }
    }
}

impl From<Cancelled> for StateError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<TransitionError> for StateError {
    fn from(err: TransitionError) -> Self {
        Self::Transition(Box::new(err))
    }
}

/// Short display name derived from a type: `my_game::ai::Wander` becomes
/// `Wander`, generic arguments are dropped.
pub fn state_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Behaviour installed as the current state of a state machine.
///
/// # Example
///
/// ```rust
/// use tickwise::core::{CancellationToken, State, StateError};
/// use tickwise::async_trait;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Patrol {
///     steps: AtomicUsize,
/// }
///
/// #[async_trait]
/// impl State for Patrol {
///     async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
///         token.check()?;
///         self.steps.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
///
/// let patrol = Patrol { steps: AtomicUsize::new(0) };
/// assert_eq!(patrol.name(), "Patrol");
/// ```
#[async_trait]
pub trait State: Send + Sync {
    /// Name used in logs, history and snapshots.
    fn name(&self) -> &str {
        state_name::<Self>()
    }

    /// Called once per activation when no transition data is supplied.
    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    /// Called once per activation when transition data is supplied.
    async fn enter_with_data(
        &self,
        _data: TransitionData,
        _token: &CancellationToken,
    ) -> Result<(), StateError> {
        Ok(())
    }

    async fn update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    async fn late_update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    async fn fixed_update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    /// Teardown hook. Takes no token: exit always runs to completion, even
    /// when the state's lifetime has already been cancelled.
    async fn exit(&self) -> Result<(), StateError> {
        Ok(())
    }
}

/// Unit of behaviour owned by a [`ParentState`].
///
/// `P` is what the sub-state sees as its parent. The default, `dyn State`,
/// fits sub-states of a plain [`ParentState`]. A state that embeds a
/// `ParentState<Self>` hands its sub-states a typed back-reference, so
/// they can read its context directly. Switching the active sub-state goes
/// through [`ParentState::go_to_sub_state`].
///
/// [`ParentState`]: crate::runtime::ParentState
/// [`ParentState::go_to_sub_state`]: crate::runtime::ParentState::go_to_sub_state
#[async_trait]
pub trait SubState<P: ?Sized = dyn State>: Send + Sync {
    /// Back-reference to the owning parent.
    fn parent(&self) -> &Weak<P>;

    fn name(&self) -> &str {
        state_name::<Self>()
    }

    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    async fn enter_with_data(
        &self,
        _data: TransitionData,
        _token: &CancellationToken,
    ) -> Result<(), StateError> {
        Ok(())
    }

    async fn update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    async fn late_update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    async fn fixed_update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        Ok(())
    }

    async fn exit(&self) -> Result<(), StateError> {
        Ok(())
    }
}

/// Invoke the tick hook of `state` that matches `channel`.
pub(crate) async fn tick_state(
    state: &dyn State,
    channel: TickChannel,
    token: &CancellationToken,
) -> Result<(), StateError> {
    match channel {
        TickChannel::Update => state.update(token).await,
        TickChannel::LateUpdate => state.late_update(token).await,
        TickChannel::FixedUpdate => state.fixed_update(token).await,
    }
}

pub(crate) async fn tick_sub_state<P: ?Sized>(
    sub_state: &dyn SubState<P>,
    channel: TickChannel,
    token: &CancellationToken,
) -> Result<(), StateError> {
    match channel {
        TickChannel::Update => sub_state.update(token).await,
        TickChannel::LateUpdate => sub_state.late_update(token).await,
        TickChannel::FixedUpdate => sub_state.fixed_update(token).await,
    }
}

/// Reference identity of two shared objects, ignoring vtable metadata.
pub(crate) fn same_object<T: ?Sized>(left: &Arc<T>, right: &Arc<T>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(left) as *const (),
        Arc::as_ptr(right) as *const (),
    )
}
