//! Enemy AI State Machine
//!
//! An enemy wanders until it attacks or gets hit. Attack and Hit run their
//! whole behaviour inside `enter` and hand control back to Wander when done.
//!
//! Key concepts:
//! - Tick hooks driven by a timer-based `FrameDriver`
//! - Transitions requested from inside a state through `WeakStateMachine`
//! - A newer transition cancelling an entry that is still running
//!
//! Run with: cargo run --example enemy_ai

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickwise::logging::{Logger, Severity};
use tickwise::scheduler::{DriverConfig, FrameDriver, FrameScheduler};
use tickwise::{
    async_trait, CancellationScope, CancellationToken, State, StateError, StateMachine,
    WeakStateMachine,
};

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, severity: Severity, message: &str) {
        println!("  {severity:?}: {message}");
    }
}

#[derive(Default)]
struct Wander {
    frames: AtomicU64,
}

#[async_trait]
impl State for Wander {
    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        println!("  Wandering...");
        Ok(())
    }

    async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
        token.check()?;
        let frames = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frames % 30 == 0 {
            println!("  ...still wandering ({frames} frames)");
        }
        Ok(())
    }

    async fn exit(&self) -> Result<(), StateError> {
        println!("  Stopped wandering");
        Ok(())
    }
}

/// Sleep unless the state's lifetime ends first.
async fn pause(token: &CancellationToken, millis: u64) -> Result<(), StateError> {
    token
        .run_until_cancelled(tokio::time::sleep(Duration::from_millis(millis)))
        .await?;
    Ok(())
}

async fn back_to_wander(machine: &WeakStateMachine) -> Result<(), StateError> {
    if let Some(machine) = machine.upgrade() {
        machine.go_to_state(Arc::new(Wander::default())).await?;
    }
    Ok(())
}

struct Attack {
    machine: WeakStateMachine,
}

#[async_trait]
impl State for Attack {
    async fn enter(&self, token: &CancellationToken) -> Result<(), StateError> {
        println!("  Attacking!");
        pause(token, 500).await?;
        println!("  ATTACK!");
        pause(token, 1000).await?;
        back_to_wander(&self.machine).await
    }
}

struct Hit {
    machine: WeakStateMachine,
}

#[async_trait]
impl State for Hit {
    async fn enter(&self, token: &CancellationToken) -> Result<(), StateError> {
        println!("  Ouch!");
        pause(token, 750).await?;
        back_to_wander(&self.machine).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Enemy AI State Machine ===\n");

    let scheduler = Arc::new(FrameScheduler::new());
    let lifetime = CancellationScope::new();
    let driver = FrameDriver::new(scheduler.clone(), DriverConfig::default())?;
    let pump = driver.spawn(lifetime.token());

    let machine = StateMachine::builder()
        .name("enemy")
        .scheduler(scheduler)
        .logger(Arc::new(ConsoleLogger))
        .root_token(lifetime.token())
        .build()?;

    println!("Start wandering:");
    machine.go_to_state(Arc::new(Wander::default())).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    println!("\nAttack, then wander again:");
    machine
        .go_to_state(Arc::new(Attack {
            machine: machine.downgrade(),
        }))
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("\nGet hit while charging an attack:");
    let charging = {
        let machine = machine.clone();
        tokio::spawn(async move {
            let attack = Arc::new(Attack {
                machine: machine.downgrade(),
            });
            machine.go_to_state(attack).await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    machine
        .go_to_state(Arc::new(Hit {
            machine: machine.downgrade(),
        }))
        .await?;
    match charging.await? {
        Err(err) if err.is_cancelled() => println!("  Attack was interrupted: {err}"),
        other => println!("  Attack finished: {other:?}"),
    }
    println!("  Now: {:?}", machine.current_state_name());

    println!("\nHistory:");
    for record in machine.history().records() {
        println!("  {:?} -> {:?}", record.from, record.to);
    }

    println!("\nSnapshot:\n{}", machine.snapshot().to_json_pretty()?);

    machine.go_to_idle().await?;
    lifetime.cancel();
    pump.await?;

    println!("\n=== Example Complete ===");
    Ok(())
}
