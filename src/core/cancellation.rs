//! Cooperative cancellation scopes and tokens.
//!
//! A [`CancellationScope`] owns the right to cancel; every
//! [`CancellationToken`] handed out by it only observes. Both wrap
//! [`tokio_util::sync::CancellationToken`], which any holder could cancel,
//! so the observer type deliberately exposes no `cancel`.
//!
//! Scopes may be nested: a scope created with
//! [`CancellationScope::child_of`] is cancelled whenever its parent token
//! is cancelled, but cancelling the child never affects the parent.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken as Source;

/// Marker error returned when a wait is interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Read-only view of a cancellation scope.
///
/// # Example
///
/// ```rust
/// use tickwise::core::CancellationScope;
///
/// let scope = CancellationScope::new();
/// let token = scope.token();
/// assert!(!token.is_cancelled());
///
/// scope.cancel();
/// assert!(token.is_cancelled());
/// assert!(token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    source: Source,
}

impl CancellationToken {
    /// A token that is never cancelled unless derived scopes are.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    /// Return `Err(Cancelled)` once cancellation has been requested.
    ///
    /// Hooks use this with `?` at their own suspension points.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        self.source.cancelled().await
    }

    /// Drive `future` to completion unless cancellation fires first.
    ///
    /// Cancellation is checked before the future is polled, so an already
    /// cancelled token never starts the wrapped work.
    pub async fn run_until_cancelled<F>(&self, future: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.source.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}

/// Owner of a cancellable lifetime.
///
/// Dropping or disposing a scope does not cancel it; cancellation is always
/// an explicit [`cancel`](Self::cancel).
#[derive(Debug, Default)]
pub struct CancellationScope {
    source: Source,
}

impl CancellationScope {
    /// Create an independent root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope that is also cancelled when `parent` is.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tickwise::core::CancellationScope;
    ///
    /// let root = CancellationScope::new();
    /// let nested = CancellationScope::child_of(&root.token());
    ///
    /// nested.cancel();
    /// assert!(!root.is_cancelled());
    ///
    /// let nested = CancellationScope::child_of(&root.token());
    /// root.cancel();
    /// assert!(nested.is_cancelled());
    /// ```
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            source: parent.source.child_token(),
        }
    }

    /// Hand out an observer of this scope.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            source: self.source.clone(),
        }
    }

    /// Request cancellation of this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.source.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    /// Give up ownership of the scope. No further cancellation can be
    /// requested through it; outstanding tokens keep reporting the state
    /// the scope had at that point.
    pub fn dispose(self) {
        drop(self.source);
    }
}
