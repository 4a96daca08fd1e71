//! Hierarchical states.

use crate::core::{
    lock, same_object, tick_sub_state, CancellationScope, CancellationToken, State, StateError,
    SubState, TickChannel, TransitionData,
};
use crate::logging::{Logger, Severity, TracingLogger};
use crate::runtime::TransitionError;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A state that owns at most one active [`SubState`].
///
/// Sub-states run under a nested cancellation scope that the parent opens
/// on entry and cancels on exit. Every forwarded tick and sub-state entry
/// receives a token from this nested scope, never the token the machine
/// handed to the parent, so the nested lifetime is managed independently
/// of how the machine schedules the parent.
///
/// `P` is the parent type sub-states point back to. A bare
/// `ParentState` can be installed directly, and its sub-states hold a
/// `Weak<dyn State>`. A state with its own behaviour and data embeds a
/// `ParentState<Self>`, delegates its hooks to it, and gives sub-states a
/// `Weak<Self>` to read that data through.
///
/// If a sub-state's `exit` or entry hook fails, it is dropped from the
/// parent: it receives no further ticks and is not exited again.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Weak};
/// use tickwise::async_trait;
/// use tickwise::core::{CancellationToken, State, SubState};
/// use tickwise::runtime::ParentState;
///
/// struct Aim {
///     parent: Weak<dyn State>,
/// }
///
/// #[async_trait]
/// impl SubState for Aim {
///     fn parent(&self) -> &Weak<dyn State> {
///         &self.parent
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let combat = Arc::new(ParentState::new("Combat"));
/// combat.enter(&CancellationToken::none()).await.unwrap();
///
/// let parent: Weak<dyn State> = Arc::downgrade(&combat) as Weak<dyn State>;
/// combat.go_to_sub_state(Arc::new(Aim { parent })).await.unwrap();
/// assert_eq!(combat.current_sub_state_name().as_deref(), Some("Aim"));
///
/// combat.exit().await.unwrap();
/// assert!(combat.current_sub_state().is_none());
/// # });
/// ```
pub struct ParentState<P: ?Sized + 'static = dyn State> {
    name: String,
    logger: Arc<dyn Logger>,
    current_sub_state: Mutex<Option<Arc<dyn SubState<P>>>>,
    sub_state_scope: Mutex<Option<CancellationScope>>,
}

impl ParentState {
    pub fn new(name: impl Into<String>) -> Self {
        Self::typed(name, Arc::new(TracingLogger))
    }

    pub fn with_logger(name: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        Self::typed(name, logger)
    }
}

impl<P: ?Sized + 'static> ParentState<P> {
    /// Create a parent whose sub-states point back to a `P`, usually the
    /// state embedding it.
    pub fn typed(name: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        Self {
            name: name.into(),
            logger,
            current_sub_state: Mutex::new(None),
            sub_state_scope: Mutex::new(None),
        }
    }

    pub fn current_sub_state(&self) -> Option<Arc<dyn SubState<P>>> {
        lock(&self.current_sub_state).clone()
    }

    pub fn current_sub_state_name(&self) -> Option<String> {
        self.current_sub_state()
            .map(|sub_state| sub_state.name().to_string())
    }

    /// Token of the nested scope, present between entry and exit.
    pub fn sub_state_token(&self) -> Option<CancellationToken> {
        lock(&self.sub_state_scope)
            .as_ref()
            .map(CancellationScope::token)
    }

    /// Switch to `new_sub_state`.
    ///
    /// Returns immediately when `new_sub_state` is already the active
    /// sub-state. Otherwise the outgoing sub-state exits, the new one is
    /// installed, and its `enter` hook runs under the nested scope.
    pub async fn go_to_sub_state(
        &self,
        new_sub_state: Arc<dyn SubState<P>>,
    ) -> Result<(), TransitionError> {
        let token = self
            .sub_state_token()
            .ok_or_else(|| TransitionError::ParentNotEntered {
                parent: self.name.clone(),
            })?;

        let outgoing = self.current_sub_state();
        if let Some(outgoing) = outgoing {
            if same_object(&outgoing, &new_sub_state) {
                return Ok(());
            }
            if let Err(source) = outgoing.exit().await {
                self.clear_if_current(&outgoing);
                return Err(TransitionError::ExitFailed {
                    state: outgoing.name().to_string(),
                    source,
                });
            }
        }

        *lock(&self.current_sub_state) = Some(Arc::clone(&new_sub_state));
        self.logger.log(
            Severity::Info,
            &format!(
                "parent '{}' entering sub-state '{}'",
                self.name,
                new_sub_state.name()
            ),
        );

        if let Err(source) = new_sub_state.enter(&token).await {
            self.clear_if_current(&new_sub_state);
            return Err(TransitionError::EnterFailed {
                state: new_sub_state.name().to_string(),
                source,
            });
        }
        Ok(())
    }

    /// Switch to `new_sub_state`, then hand it `data`.
    ///
    /// Runs the full [`go_to_sub_state`](Self::go_to_sub_state) sequence,
    /// including the plain `enter` hook, before `enter_with_data` is called
    /// on whichever sub-state is active afterwards. When `new_sub_state` is
    /// already active only `enter_with_data` runs.
    pub async fn go_to_sub_state_with_data(
        &self,
        new_sub_state: Arc<dyn SubState<P>>,
        data: TransitionData,
    ) -> Result<(), TransitionError> {
        self.go_to_sub_state(new_sub_state).await?;

        let active = self.current_sub_state();
        let token = self.sub_state_token();
        let (Some(active), Some(token)) = (active, token) else {
            return Ok(());
        };
        if let Err(source) = active.enter_with_data(data, &token).await {
            self.clear_if_current(&active);
            return Err(TransitionError::EnterFailed {
                state: active.name().to_string(),
                source,
            });
        }
        Ok(())
    }

    async fn forward(&self, channel: TickChannel) -> Result<(), StateError> {
        let active = self.current_sub_state();
        let token = self.sub_state_token();
        match (active, token) {
            (Some(active), Some(token)) => tick_sub_state(active.as_ref(), channel, &token).await,
            _ => Ok(()),
        }
    }

    fn clear_if_current(&self, sub_state: &Arc<dyn SubState<P>>) {
        let mut current = lock(&self.current_sub_state);
        if current
            .as_ref()
            .is_some_and(|current| same_object(current, sub_state))
        {
            *current = None;
        }
    }
}

impl<P: ?Sized + 'static> fmt::Debug for ParentState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentState")
            .field("name", &self.name)
            .field("current_sub_state", &self.current_sub_state_name())
            .field("entered", &self.sub_state_token().is_some())
            .finish()
    }
}

#[async_trait]
impl<P: ?Sized + 'static> State for ParentState<P> {
    fn name(&self) -> &str {
        &self.name
    }

    /// Open a fresh nested scope for sub-states. A scope left over from a
    /// previous activation is cancelled first.
    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        let stale = lock(&self.sub_state_scope).replace(CancellationScope::new());
        if let Some(stale) = stale {
            stale.cancel();
            stale.dispose();
        }
        Ok(())
    }

    /// Cancel the nested scope, then exit and clear the active sub-state.
    async fn exit(&self) -> Result<(), StateError> {
        let scope = lock(&self.sub_state_scope).take();
        if let Some(scope) = scope {
            scope.cancel();
            scope.dispose();
        }

        let active = self.current_sub_state();
        let Some(active) = active else {
            return Ok(());
        };
        let exited = active.exit().await;
        self.clear_if_current(&active);
        exited
    }

    async fn update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        self.forward(TickChannel::Update).await
    }

    async fn late_update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        self.forward(TickChannel::LateUpdate).await
    }

    async fn fixed_update(&self, _token: &CancellationToken) -> Result<(), StateError> {
        self.forward(TickChannel::FixedUpdate).await
    }
}
