//! Host-pumped scheduler.

use super::Scheduler;
use crate::core::TickChannel;
use async_trait::async_trait;
use tokio::sync::watch;

/// Scheduler whose channels fire only when the host says so.
///
/// Each channel keeps a frame counter. Waiters resume on the next pulse
/// after they started waiting; pulses with nobody waiting are not queued.
///
/// # Example
///
/// ```rust
/// use tickwise::core::TickChannel;
/// use tickwise::scheduler::FrameScheduler;
///
/// let scheduler = FrameScheduler::new();
/// scheduler.tick();
/// scheduler.late_tick();
///
/// assert_eq!(scheduler.frame(TickChannel::Update), 1);
/// assert_eq!(scheduler.frame(TickChannel::FixedUpdate), 0);
/// ```
#[derive(Debug)]
pub struct FrameScheduler {
    channels: [watch::Sender<u64>; 3],
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| watch::channel(0).0),
        }
    }

    /// Fire one occurrence of `channel`.
    pub fn pulse(&self, channel: TickChannel) {
        self.channels[channel.index()].send_modify(|frame| *frame += 1);
    }

    pub fn tick(&self) {
        self.pulse(TickChannel::Update);
    }

    pub fn late_tick(&self) {
        self.pulse(TickChannel::LateUpdate);
    }

    pub fn fixed_tick(&self) {
        self.pulse(TickChannel::FixedUpdate);
    }

    /// Number of pulses fired on `channel` so far.
    pub fn frame(&self, channel: TickChannel) -> u64 {
        *self.channels[channel.index()].borrow()
    }

    /// Number of tasks currently waiting on `channel`.
    pub fn waiting(&self, channel: TickChannel) -> usize {
        self.channels[channel.index()].receiver_count()
    }
}

#[async_trait]
impl Scheduler for FrameScheduler {
    async fn wait_for(&self, channel: TickChannel) {
        let mut receiver = self.channels[channel.index()].subscribe();
        // The sender lives as long as `self`, so `changed` only returns
        // once a pulse arrives.
        let _ = receiver.changed().await;
    }
}
