//! Timer-driven host loop for a [`FrameScheduler`].

use super::FrameScheduler;
use crate::builder::BuildError;
use crate::core::CancellationToken;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Timing configuration for a [`FrameDriver`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tickwise::scheduler::DriverConfig;
///
/// let config = DriverConfig::from_json(r#"{ "frame_rate_hz": 30 }"#).unwrap();
/// assert_eq!(config.frame_rate_hz, 30);
/// assert_eq!(config.fixed_rate_hz, 50);
/// assert_eq!(config.fixed_interval(), Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Main frames per second (ordinary then late tick)
    pub frame_rate_hz: u32,
    /// Physics steps per second
    pub fixed_rate_hz: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            fixed_rate_hz: 50,
        }
    }
}

impl DriverConfig {
    /// Parse and validate a JSON configuration. Missing fields keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BuildError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.frame_rate_hz == 0 {
            return Err(BuildError::ZeroRate {
                field: "frame_rate_hz",
            });
        }
        if self.fixed_rate_hz == 0 {
            return Err(BuildError::ZeroRate {
                field: "fixed_rate_hz",
            });
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        period(self.frame_rate_hz)
    }

    pub fn fixed_interval(&self) -> Duration {
        period(self.fixed_rate_hz)
    }
}

fn period(rate_hz: u32) -> Duration {
    Duration::from_secs(1) / rate_hz.max(1)
}

/// Pumps a [`FrameScheduler`] from tokio timers.
///
/// Every frame fires the ordinary channel, yields once so ordinary ticks
/// can run, then fires the late channel. The physics channel runs on its
/// own fixed timestep and catches up on missed steps.
#[derive(Debug)]
pub struct FrameDriver {
    scheduler: Arc<FrameScheduler>,
    config: DriverConfig,
}

impl FrameDriver {
    pub fn new(scheduler: Arc<FrameScheduler>, config: DriverConfig) -> Result<Self, BuildError> {
        config.validate()?;
        Ok(Self { scheduler, config })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Pump the scheduler until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        let mut frames = tokio::time::interval(self.config.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fixed_steps = tokio::time::interval(self.config.fixed_interval());
        fixed_steps.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = fixed_steps.tick() => self.scheduler.fixed_tick(),
                _ = frames.tick() => {
                    self.scheduler.tick();
                    tokio::task::yield_now().await;
                    self.scheduler.late_tick();
                }
            }
        }
    }

    /// Run the driver on its own task.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancellationScope, TickChannel};

    #[test]
    fn default_config_is_valid() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval(), Duration::from_nanos(16_666_666));
        assert_eq!(config.fixed_interval(), Duration::from_millis(20));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let result = DriverConfig::from_json(r#"{ "fixed_rate_hz": 0 }"#);
        assert!(matches!(
            result,
            Err(BuildError::ZeroRate {
                field: "fixed_rate_hz"
            })
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let result = DriverConfig::from_json("{ frame_rate_hz: }");
        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = DriverConfig {
            frame_rate_hz: 120,
            fixed_rate_hz: 100,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(DriverConfig::from_json(&json).unwrap(), config);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_pumps_all_channels_until_cancelled() {
        let scheduler = Arc::new(FrameScheduler::new());
        let driver = FrameDriver::new(Arc::clone(&scheduler), DriverConfig::default()).unwrap();
        let scope = CancellationScope::new();
        let handle = driver.spawn(scope.token());

        tokio::time::sleep(Duration::from_millis(200)).await;
        scope.cancel();
        handle.await.unwrap();

        let frames = scheduler.frame(TickChannel::Update);
        assert!(frames >= 10, "expected at least 10 frames, got {frames}");
        assert_eq!(scheduler.frame(TickChannel::LateUpdate), frames);
        assert!(scheduler.frame(TickChannel::FixedUpdate) >= 8);

        let stopped_at = scheduler.frame(TickChannel::Update);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.frame(TickChannel::Update), stopped_at);
    }
}
