//! Scheduling collaborators.
//!
//! The runtime never owns a clock. A [`Scheduler`] exposes the three
//! independent tick channels plus a single-step yield used while draining
//! cancelled tick loops. [`FrameScheduler`] is a host-pumped implementation
//! and [`FrameDriver`] pumps one from tokio timers.

mod driver;
mod frame;

pub use driver::{DriverConfig, FrameDriver};
pub use frame::FrameScheduler;

use crate::core::{CancellationToken, Cancelled, TickChannel};
use async_trait::async_trait;

/// Source of tick occurrences for a state machine.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Wait for the next occurrence of `channel`.
    async fn wait_for(&self, channel: TickChannel);

    /// Yield exactly one scheduling step.
    async fn yield_now(&self) {
        tokio::task::yield_now().await;
    }

    /// Wait for the next occurrence of `channel`, returning early with
    /// `Err(Cancelled)` if `token` fires first.
    async fn next_tick(
        &self,
        channel: TickChannel,
        token: &CancellationToken,
    ) -> Result<(), Cancelled> {
        token.run_until_cancelled(self.wait_for(channel)).await
    }
}
