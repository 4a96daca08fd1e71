//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tickwise::async_trait;
use tickwise::logging::MemoryLogger;
use tickwise::scheduler::FrameScheduler;
use tickwise::{
    CancellationToken, ParentState, State, StateError, StateMachine, SubState, TickChannel,
    TransitionData,
};

/// Ordered record of hook invocations across every fixture.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }
}

pub struct Harness {
    pub scheduler: Arc<FrameScheduler>,
    pub logger: Arc<MemoryLogger>,
    pub machine: StateMachine,
    pub journal: Journal,
}

impl Harness {
    pub fn new() -> Self {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = StateMachine::builder()
            .name("enemy")
            .scheduler(scheduler.clone())
            .logger(logger.clone())
            .build()
            .unwrap();
        Self {
            scheduler,
            logger,
            machine,
            journal: Journal::default(),
        }
    }

    pub async fn pump(&self, channel: TickChannel) {
        settle().await;
        self.scheduler.pulse(channel);
        settle().await;
    }

    pub async fn pump_frame(&self) {
        for channel in TickChannel::ALL {
            self.pump(channel).await;
        }
    }
}

/// Give every runnable task a chance to reach its next suspension point.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn slot(channel: TickChannel) -> usize {
    match channel {
        TickChannel::Update => 0,
        TickChannel::LateUpdate => 1,
        TickChannel::FixedUpdate => 2,
    }
}

/// State that journals entry/exit and counts ticks per channel.
pub struct Tracer {
    label: String,
    journal: Journal,
    ticks: [AtomicUsize; 3],
    fail_at: Option<(TickChannel, usize)>,
}

impl Tracer {
    pub fn new(label: &str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            journal: journal.clone(),
            ticks: Default::default(),
            fail_at: None,
        })
    }

    /// A tracer whose `channel` hook faults on its `nth` invocation.
    pub fn failing(label: &str, journal: &Journal, channel: TickChannel, nth: usize) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            journal: journal.clone(),
            ticks: Default::default(),
            fail_at: Some((channel, nth)),
        })
    }

    pub fn ticks(&self, channel: TickChannel) -> usize {
        self.ticks[slot(channel)].load(Ordering::SeqCst)
    }

    fn tick(&self, channel: TickChannel, token: &CancellationToken) -> Result<(), StateError> {
        token.check()?;
        let count = self.ticks[slot(channel)].fetch_add(1, Ordering::SeqCst) + 1;
        match self.fail_at {
            Some((failing, nth)) if failing == channel && nth == count => {
                Err(StateError::fault(format!("{} broke on tick {count}", self.label)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl State for Tracer {
    fn name(&self) -> &str {
        &self.label
    }

    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        self.journal.push(format!("{}.enter", self.label));
        Ok(())
    }

    async fn enter_with_data(
        &self,
        data: TransitionData,
        _token: &CancellationToken,
    ) -> Result<(), StateError> {
        let data = data.downcast::<String>().map(|d| *d).unwrap_or_default();
        self.journal.push(format!("{}.enter({data})", self.label));
        Ok(())
    }

    async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.tick(TickChannel::Update, token)
    }

    async fn late_update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.tick(TickChannel::LateUpdate, token)
    }

    async fn fixed_update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.tick(TickChannel::FixedUpdate, token)
    }

    async fn exit(&self) -> Result<(), StateError> {
        self.journal.push(format!("{}.exit", self.label));
        Ok(())
    }
}

/// Sub-state that journals entry/exit, counts ticks per channel and keeps
/// the token each channel last handed it.
pub struct Step<P: ?Sized = dyn State> {
    label: String,
    parent: Weak<P>,
    journal: Journal,
    ticks: [AtomicUsize; 3],
    tokens: [Mutex<Option<CancellationToken>>; 3],
}

impl Step {
    pub fn new(label: &str, parent: &Arc<ParentState>, journal: &Journal) -> Arc<Self> {
        Step::with_parent(label, Arc::downgrade(parent) as Weak<dyn State>, journal)
    }
}

impl<P: ?Sized> Step<P> {
    pub fn with_parent(label: &str, parent: Weak<P>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            parent,
            journal: journal.clone(),
            ticks: Default::default(),
            tokens: Default::default(),
        })
    }

    pub fn ticks(&self, channel: TickChannel) -> usize {
        self.ticks[slot(channel)].load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.ticks(TickChannel::Update)
    }

    pub fn token_seen(&self, channel: TickChannel) -> Option<CancellationToken> {
        self.tokens[slot(channel)].lock().unwrap().clone()
    }

    fn tick(&self, channel: TickChannel, token: &CancellationToken) -> Result<(), StateError> {
        token.check()?;
        *self.tokens[slot(channel)].lock().unwrap() = Some(token.clone());
        self.ticks[slot(channel)].fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl<P: ?Sized + Send + Sync + 'static> SubState<P> for Step<P> {
    fn parent(&self) -> &Weak<P> {
        &self.parent
    }

    fn name(&self) -> &str {
        &self.label
    }

    async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
        self.journal.push(format!("{}.enter", self.label));
        Ok(())
    }

    async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.tick(TickChannel::Update, token)
    }

    async fn late_update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.tick(TickChannel::LateUpdate, token)
    }

    async fn fixed_update(&self, token: &CancellationToken) -> Result<(), StateError> {
        self.tick(TickChannel::FixedUpdate, token)
    }

    async fn exit(&self) -> Result<(), StateError> {
        self.journal.push(format!("{}.exit", self.label));
        Ok(())
    }
}
