//! Hierarchical Combat State
//!
//! A `Combat` state embeds a `ParentState<Combat>` and switches between two
//! sub-states: Aim fires on physics steps until the magazine is empty, then
//! Reload refills it over a few frames and hands back to Aim.
//!
//! Key concepts:
//! - Sub-states with a typed back-reference to their parent's data
//! - Sub-state switches requested from a sub-state's own tick hook
//! - Leaving the parent cancels the nested scope and exits the sub-state
//!
//! Run with: cargo run --example hierarchical_combat

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tickwise::logging::{Logger, Severity};
use tickwise::scheduler::{DriverConfig, FrameDriver, FrameScheduler};
use tickwise::{
    async_trait, CancellationScope, CancellationToken, ParentState, State, StateError,
    StateMachine, SubState,
};

const MAGAZINE: u32 = 3;

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, severity: Severity, message: &str) {
        println!("  {severity:?}: {message}");
    }
}

struct Combat {
    nest: ParentState<Combat>,
    ammo: AtomicU32,
    aim: Arc<Aim>,
    reload: Arc<Reload>,
}

impl Combat {
    fn new(logger: Arc<dyn Logger>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Combat>| Combat {
            nest: ParentState::typed("Combat", logger),
            ammo: AtomicU32::new(MAGAZINE),
            aim: Arc::new(Aim {
                parent: me.clone(),
                steps: AtomicU32::new(0),
            }),
            reload: Arc::new(Reload {
                parent: me.clone(),
                frames: AtomicU32::new(0),
            }),
        })
    }
}

#[async_trait]
impl State for Combat {
    async fn enter(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.nest.enter(token).await?;
        self.nest.go_to_sub_state(self.aim.clone()).await?;
        Ok(())
    }

    async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.nest.update(token).await
    }

    async fn fixed_update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.nest.fixed_update(token).await
    }

    async fn exit(&self) -> Result<(), StateError> {
        self.nest.exit().await
    }
}

struct Aim {
    parent: Weak<Combat>,
    steps: AtomicU32,
}

#[async_trait]
impl SubState<Combat> for Aim {
    fn parent(&self) -> &Weak<Combat> {
        &self.parent
    }

    async fn fixed_update(&self, token: &CancellationToken) -> Result<(), StateError> {
        token.check()?;
        if self.steps.fetch_add(1, Ordering::Relaxed) % 10 != 9 {
            return Ok(());
        }
        let Some(combat) = self.parent.upgrade() else {
            return Ok(());
        };
        let left = combat.ammo.load(Ordering::Relaxed);
        if left == 0 {
            println!("  click, out of ammo");
            combat.nest.go_to_sub_state(combat.reload.clone()).await?;
            return Ok(());
        }
        combat.ammo.store(left - 1, Ordering::Relaxed);
        println!("  bang ({} left)", left - 1);
        Ok(())
    }
}

struct Reload {
    parent: Weak<Combat>,
    frames: AtomicU32,
}

#[async_trait]
impl SubState<Combat> for Reload {
    fn parent(&self) -> &Weak<Combat> {
        &self.parent
    }

    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        self.frames.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
        token.check()?;
        if self.frames.fetch_add(1, Ordering::Relaxed) + 1 < 30 {
            return Ok(());
        }
        let Some(combat) = self.parent.upgrade() else {
            return Ok(());
        };
        combat.ammo.store(MAGAZINE, Ordering::Relaxed);
        println!("  reloaded");
        combat.nest.go_to_sub_state(combat.aim.clone()).await?;
        Ok(())
    }

    async fn exit(&self) -> Result<(), StateError> {
        println!("  reload done or abandoned");
        Ok(())
    }
}

struct Retreat;

#[async_trait]
impl State for Retreat {
    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        println!("  Falling back");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Hierarchical Combat State ===\n");

    let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger);
    let scheduler = Arc::new(FrameScheduler::new());
    let lifetime = CancellationScope::new();
    let pump = FrameDriver::new(scheduler.clone(), DriverConfig::default())?
        .spawn(lifetime.token());

    let machine = StateMachine::builder()
        .name("soldier")
        .scheduler(scheduler)
        .logger(logger.clone())
        .root_token(lifetime.token())
        .build()?;

    println!("Engage:");
    let combat = Combat::new(logger);
    machine.go_to_state(combat.clone()).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!(
        "  Active sub-state: {:?}",
        combat.nest.current_sub_state_name()
    );

    println!("\nRetreat:");
    machine.go_to_state(Arc::new(Retreat)).await?;
    println!(
        "  Combat sub-state after leaving: {:?}",
        combat.nest.current_sub_state_name()
    );

    lifetime.cancel();
    pump.await?;

    println!("\n=== Example Complete ===");
    Ok(())
}
