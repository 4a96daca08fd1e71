//! State machine that drives async states from three tick channels.

use crate::core::{
    lock, same_object, tick_state, CancellationScope, CancellationToken, State, TickChannel,
    TransitionData, TransitionHistory, TransitionRecord,
};
use crate::logging::{Logger, Severity};
use crate::runtime::TransitionError;
use crate::scheduler::Scheduler;
use crate::snapshot::{MachineSnapshot, SNAPSHOT_VERSION};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

/// Lifetime of the tick loops started for one activation.
struct ActiveScope {
    generation: u64,
    scope: CancellationScope,
}

impl ActiveScope {
    fn release(self) {
        self.scope.cancel();
        self.scope.dispose();
    }
}

pub(crate) struct MachineInner {
    name: String,
    scheduler: Arc<dyn Scheduler>,
    logger: Arc<dyn Logger>,
    root: Option<CancellationToken>,
    current: Mutex<Option<Arc<dyn State>>>,
    active: Mutex<Option<ActiveScope>>,
    generation: AtomicU64,
    running_loops: Arc<AtomicUsize>,
    history: Mutex<TransitionHistory>,
    created_at: DateTime<Utc>,
}

impl Drop for MachineInner {
    fn drop(&mut self) {
        let active = lock(&self.active).take();
        if let Some(active) = active {
            active.release();
        }
    }
}

/// Hierarchical, cooperatively scheduled state machine.
///
/// `StateMachine` is a cheap handle; clones drive the same machine. States
/// that need to request transitions keep a [`WeakStateMachine`] so the
/// machine and its current state do not keep each other alive.
///
/// A transition cancels the outgoing state's tick loops, yields one
/// scheduling step so in-flight ticks observe the cancellation, exits the
/// outgoing state, installs and enters the new state, and finally starts
/// one tick loop per [`TickChannel`] if the new state is still current.
///
/// Tick loops are spawned on the ambient tokio runtime, so transitions must
/// be awaited from within one.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tickwise::async_trait;
/// use tickwise::core::{CancellationToken, State, StateError};
/// use tickwise::runtime::StateMachine;
/// use tickwise::scheduler::FrameScheduler;
///
/// struct Wander;
///
/// #[async_trait]
/// impl State for Wander {}
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let scheduler = Arc::new(FrameScheduler::new());
/// let machine = StateMachine::builder().scheduler(scheduler).build().unwrap();
///
/// machine.go_to_state(Arc::new(Wander)).await.unwrap();
/// assert_eq!(machine.current_state_name().as_deref(), Some("Wander"));
/// assert_eq!(machine.running_loops(), 3);
///
/// machine.shutdown();
/// # });
/// ```
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<MachineInner>,
}

/// Non-owning handle to a [`StateMachine`].
#[derive(Clone, Default)]
pub struct WeakStateMachine {
    inner: Weak<MachineInner>,
}

impl WeakStateMachine {
    pub fn upgrade(&self) -> Option<StateMachine> {
        self.inner.upgrade().map(|inner| StateMachine { inner })
    }
}

impl fmt::Debug for WeakStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStateMachine")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl StateMachine {
    pub(crate) fn from_parts(
        name: String,
        scheduler: Arc<dyn Scheduler>,
        logger: Arc<dyn Logger>,
        root: Option<CancellationToken>,
        history: TransitionHistory,
    ) -> Self {
        Self {
            inner: Arc::new(MachineInner {
                name,
                scheduler,
                logger,
                root,
                current: Mutex::new(None),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                running_loops: Arc::new(AtomicUsize::new(0)),
                history: Mutex::new(history),
                created_at: Utc::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn downgrade(&self) -> WeakStateMachine {
        WeakStateMachine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn current_state(&self) -> Option<Arc<dyn State>> {
        lock(&self.inner.current).clone()
    }

    pub fn current_state_name(&self) -> Option<String> {
        self.current_state().map(|state| state.name().to_string())
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.inner.current).is_none()
    }

    /// True if `state` is the installed current state (reference identity).
    pub fn is_current(&self, state: &Arc<dyn State>) -> bool {
        lock(&self.inner.current)
            .as_ref()
            .is_some_and(|current| same_object(current, state))
    }

    /// Number of tick loops that have not yet stopped.
    pub fn running_loops(&self) -> usize {
        self.inner.running_loops.load(Ordering::SeqCst)
    }

    pub fn history(&self) -> TransitionHistory {
        lock(&self.inner.history).clone()
    }

    /// Transition to `new_state` and enter it without data.
    pub async fn go_to_state(&self, new_state: Arc<dyn State>) -> Result<(), TransitionError> {
        self.transition(new_state, None).await
    }

    /// Transition to `new_state` and enter it through
    /// [`State::enter_with_data`].
    pub async fn go_to_state_with_data(
        &self,
        new_state: Arc<dyn State>,
        data: TransitionData,
    ) -> Result<(), TransitionError> {
        self.transition(new_state, Some(data)).await
    }

    /// Leave the current state and stay idle. Does nothing on an idle
    /// machine.
    pub async fn go_to_idle(&self) -> Result<(), TransitionError> {
        let from = self.release_outgoing().await?;
        let Some(from) = from else {
            return Ok(());
        };
        *lock(&self.inner.current) = None;
        self.record(Some(from.as_str()), None, false);
        self.inner
            .logger
            .log(Severity::Info, &format!("[{}] idle", self.inner.name));
        Ok(())
    }

    /// Cancel the current state's tick loops.
    ///
    /// The current state stays installed and its `exit` hook is not run;
    /// hosts that need a clean exit call [`go_to_idle`](Self::go_to_idle)
    /// first.
    pub fn shutdown(&self) {
        let active = lock(&self.inner.active).take();
        if let Some(active) = active {
            active.release();
        }
        self.inner.logger.log(
            Severity::Info,
            &format!("[{}] shut down", self.inner.name),
        );
    }

    /// Capture a serializable view of the machine for diagnostics.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            machine: self.inner.name.clone(),
            created_at: self.inner.created_at,
            current_state: self.current_state_name(),
            running_loops: self.running_loops(),
            history: self.history(),
        }
    }

    async fn transition(
        &self,
        new_state: Arc<dyn State>,
        data: Option<TransitionData>,
    ) -> Result<(), TransitionError> {
        let from = self.release_outgoing().await?;

        *lock(&self.inner.current) = Some(Arc::clone(&new_state));
        self.record(from.as_deref(), Some(new_state.name()), data.is_some());
        self.inner.logger.log(
            Severity::Info,
            &format!("[{}] entering state '{}'", self.inner.name, new_state.name()),
        );

        let (generation, token) = self.open_scope();
        let entered = match data {
            Some(data) => new_state.enter_with_data(data, &token).await,
            None => new_state.enter(&token).await,
        };
        if let Err(source) = entered {
            self.abandon(generation, &new_state);
            return Err(TransitionError::EnterFailed {
                state: new_state.name().to_string(),
                source,
            });
        }

        // A transition issued during `enter` has already replaced this one.
        if !token.is_cancelled() && self.is_current(&new_state) {
            for channel in TickChannel::ALL {
                self.spawn_tick_loop(channel, token.clone());
            }
        }
        Ok(())
    }

    /// Cancel and drain the active tick loops, then exit the current state.
    /// Returns the name of the state that was exited.
    async fn release_outgoing(&self) -> Result<Option<String>, TransitionError> {
        let previous = lock(&self.inner.active).take();
        if let Some(previous) = previous {
            previous.scope.cancel();
            // Let in-flight ticks observe the cancellation before the
            // scope is released.
            self.inner.scheduler.yield_now().await;
            previous.scope.dispose();
        }

        let outgoing = self.current_state();
        let Some(outgoing) = outgoing else {
            return Ok(None);
        };
        let name = outgoing.name().to_string();
        if let Err(source) = outgoing.exit().await {
            self.clear_if_current(&outgoing);
            return Err(TransitionError::ExitFailed { state: name, source });
        }
        Ok(Some(name))
    }

    fn open_scope(&self) -> (u64, CancellationToken) {
        let scope = match &self.inner.root {
            Some(root) => CancellationScope::child_of(root),
            None => CancellationScope::new(),
        };
        let token = scope.token();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let displaced = lock(&self.inner.active).replace(ActiveScope { generation, scope });
        if let Some(displaced) = displaced {
            displaced.release();
        }
        (generation, token)
    }

    /// Release the scope opened for a failed entry and drop the state it
    /// was opened for. Once a newer transition has taken the scope, that
    /// transition owns the teardown of `state`, exit included.
    fn abandon(&self, generation: u64, state: &Arc<dyn State>) {
        let stale = {
            let mut active = lock(&self.inner.active);
            if active
                .as_ref()
                .is_some_and(|active| active.generation == generation)
            {
                active.take()
            } else {
                None
            }
        };
        if let Some(stale) = stale {
            stale.release();
            self.clear_if_current(state);
        }
    }

    fn clear_if_current(&self, state: &Arc<dyn State>) {
        let mut current = lock(&self.inner.current);
        if current
            .as_ref()
            .is_some_and(|current| same_object(current, state))
        {
            *current = None;
        }
    }

    fn record(&self, from: Option<&str>, to: Option<&str>, with_data: bool) {
        let mut history = lock(&self.inner.history);
        *history = history.record(TransitionRecord::new(from, to, with_data));
    }

    fn spawn_tick_loop(&self, channel: TickChannel, token: CancellationToken) {
        let alive = LoopGuard::start(Arc::clone(&self.inner.running_loops));
        let machine = Arc::downgrade(&self.inner);
        let scheduler = Arc::clone(&self.inner.scheduler);
        tokio::spawn(async move {
            let _alive = alive;
            run_tick_loop(machine, scheduler, channel, token).await;
        });
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.inner.name)
            .field("current_state", &self.current_state_name())
            .field("running_loops", &self.running_loops())
            .finish()
    }
}

/// Counts a tick loop as running for as long as it is alive.
struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn start(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tick one channel of the current state until `token` is cancelled.
///
/// The current state is re-read on every occurrence. A hook fault is logged
/// and stops this channel only.
async fn run_tick_loop(
    machine: Weak<MachineInner>,
    scheduler: Arc<dyn Scheduler>,
    channel: TickChannel,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        if scheduler.next_tick(channel, &token).await.is_err() {
            return;
        }

        let Some(inner) = machine.upgrade() else {
            return;
        };
        let current = lock(&inner.current).clone();
        let logger = Arc::clone(&inner.logger);
        let machine_name = inner.name.clone();
        drop(inner);

        let Some(state) = current else {
            continue;
        };
        if token.is_cancelled() {
            return;
        }

        match tick_state(state.as_ref(), channel, &token).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => return,
            Err(err) => {
                logger.log(
                    Severity::Error,
                    &format!(
                        "[{}] {} loop of '{}' stopped: {}",
                        machine_name,
                        channel.name(),
                        state.name(),
                        err
                    ),
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateError;
    use crate::logging::MemoryLogger;
    use crate::scheduler::FrameScheduler;
    use async_trait::async_trait;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Tracer {
        label: &'static str,
        journal: Journal,
        ticks: [AtomicUsize; 3],
    }

    impl Tracer {
        fn new(label: &'static str, journal: &Journal) -> Arc<Self> {
            Arc::new(Self {
                label,
                journal: Arc::clone(journal),
                ticks: Default::default(),
            })
        }

        fn ticks(&self, channel: TickChannel) -> usize {
            self.ticks[channel.index()].load(Ordering::SeqCst)
        }

        fn note(&self, event: &str) {
            lock(&self.journal).push(format!("{}.{}", self.label, event));
        }

        fn count(&self, channel: TickChannel, token: &CancellationToken) -> Result<(), StateError> {
            token.check()?;
            self.ticks[channel.index()].fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl State for Tracer {
        fn name(&self) -> &str {
            self.label
        }

        async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
            self.note("enter");
            Ok(())
        }

        async fn enter_with_data(
            &self,
            data: TransitionData,
            _token: &CancellationToken,
        ) -> Result<(), StateError> {
            let target = data
                .downcast::<&'static str>()
                .map_err(|_| StateError::fault("unexpected payload"))?;
            self.note(&format!("enter({target})"));
            Ok(())
        }

        async fn update(&self, token: &CancellationToken) -> Result<(), StateError> {
            self.count(TickChannel::Update, token)
        }

        async fn late_update(&self, token: &CancellationToken) -> Result<(), StateError> {
            self.count(TickChannel::LateUpdate, token)
        }

        async fn fixed_update(&self, token: &CancellationToken) -> Result<(), StateError> {
            self.count(TickChannel::FixedUpdate, token)
        }

        async fn exit(&self) -> Result<(), StateError> {
            self.note("exit");
            Ok(())
        }
    }

    struct Broken {
        on_enter: bool,
    }

    #[async_trait]
    impl State for Broken {
        async fn enter(&self, _token: &CancellationToken) -> Result<(), StateError> {
            if self.on_enter {
                Err(StateError::fault("cannot enter"))
            } else {
                Ok(())
            }
        }

        async fn exit(&self) -> Result<(), StateError> {
            if self.on_enter {
                Ok(())
            } else {
                Err(StateError::fault("cannot exit"))
            }
        }
    }

    fn build_machine(scheduler: &Arc<FrameScheduler>, logger: &Arc<MemoryLogger>) -> StateMachine {
        StateMachine::builder()
            .name("test")
            .scheduler(scheduler.clone())
            .logger(logger.clone())
            .build()
            .unwrap()
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn pump(scheduler: &FrameScheduler, channel: TickChannel) {
        settle().await;
        scheduler.pulse(channel);
        settle().await;
    }

    #[tokio::test]
    async fn first_transition_enters_and_starts_three_loops() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();
        let a = Tracer::new("A", &journal);

        assert!(machine.is_idle());
        machine.go_to_state(a.clone()).await.unwrap();

        assert_eq!(machine.running_loops(), 3);
        assert_eq!(machine.current_state_name().as_deref(), Some("A"));
        assert_eq!(lock(&journal).clone(), vec!["A.enter"]);
    }

    #[tokio::test]
    async fn each_channel_ticks_independently() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let a = Tracer::new("A", &Journal::default());
        machine.go_to_state(a.clone()).await.unwrap();

        pump(&scheduler, TickChannel::Update).await;
        pump(&scheduler, TickChannel::Update).await;
        pump(&scheduler, TickChannel::FixedUpdate).await;

        assert_eq!(a.ticks(TickChannel::Update), 2);
        assert_eq!(a.ticks(TickChannel::LateUpdate), 0);
        assert_eq!(a.ticks(TickChannel::FixedUpdate), 1);
    }

    #[tokio::test]
    async fn transition_moves_loops_to_new_state() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();
        let a = Tracer::new("A", &journal);
        let b = Tracer::new("B", &journal);

        machine.go_to_state(a.clone()).await.unwrap();
        pump(&scheduler, TickChannel::Update).await;
        machine.go_to_state(b.clone()).await.unwrap();
        settle().await;

        assert_eq!(machine.running_loops(), 3);
        pump(&scheduler, TickChannel::Update).await;
        pump(&scheduler, TickChannel::LateUpdate).await;

        assert_eq!(a.ticks(TickChannel::Update), 1);
        assert_eq!(a.ticks(TickChannel::LateUpdate), 0);
        assert_eq!(b.ticks(TickChannel::Update), 1);
        assert_eq!(b.ticks(TickChannel::LateUpdate), 1);
        assert_eq!(lock(&journal).clone(), vec!["A.enter", "A.exit", "B.enter"]);
    }

    #[tokio::test]
    async fn data_transition_uses_data_entry_only() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();
        let a = Tracer::new("A", &journal);

        machine
            .go_to_state_with_data(a, Box::new("player"))
            .await
            .unwrap();

        assert_eq!(lock(&journal).clone(), vec!["A.enter(player)"]);
        assert!(machine.history().last().unwrap().with_data);
    }

    #[tokio::test]
    async fn go_to_idle_exits_and_stops_loops() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();
        machine
            .go_to_state(Tracer::new("A", &journal))
            .await
            .unwrap();

        machine.go_to_idle().await.unwrap();
        settle().await;

        assert!(machine.is_idle());
        assert_eq!(machine.running_loops(), 0);
        assert_eq!(lock(&journal).clone(), vec!["A.enter", "A.exit"]);
        assert_eq!(machine.history().get_path(), vec![None, Some("A"), None]);
    }

    #[tokio::test]
    async fn go_to_idle_on_idle_machine_records_nothing() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);

        machine.go_to_idle().await.unwrap();
        machine.go_to_idle().await.unwrap();

        assert!(machine.history().is_empty());
        assert!(!logger.contains("idle"));
    }

    #[tokio::test]
    async fn shutdown_cancels_loops_without_exit() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();
        machine
            .go_to_state(Tracer::new("A", &journal))
            .await
            .unwrap();

        machine.shutdown();
        settle().await;

        assert_eq!(machine.running_loops(), 0);
        assert_eq!(machine.current_state_name().as_deref(), Some("A"));
        assert_eq!(lock(&journal).clone(), vec!["A.enter"]);
        assert_eq!(logger.count(Severity::Error), 0);
    }

    #[tokio::test]
    async fn dropping_last_handle_stops_loops() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let counter = Arc::clone(&machine.inner.running_loops);
        machine
            .go_to_state(Tracer::new("A", &Journal::default()))
            .await
            .unwrap();

        drop(machine);
        settle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enter_failure_releases_scope_and_goes_idle() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);

        let result = machine
            .go_to_state(Arc::new(Broken { on_enter: true }))
            .await;

        assert!(matches!(
            result,
            Err(TransitionError::EnterFailed { ref state, .. }) if state == "Broken"
        ));
        assert!(machine.is_idle());
        assert_eq!(machine.running_loops(), 0);
        assert!(lock(&machine.inner.active).is_none());
    }

    #[tokio::test]
    async fn exit_failure_leaves_machine_idle() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();
        machine
            .go_to_state(Arc::new(Broken { on_enter: false }))
            .await
            .unwrap();

        let result = machine.go_to_state(Tracer::new("B", &journal)).await;
        settle().await;

        assert!(matches!(result, Err(TransitionError::ExitFailed { .. })));
        assert!(machine.is_idle());
        assert_eq!(machine.running_loops(), 0);
        assert!(lock(&journal).is_empty());
    }

    #[tokio::test]
    async fn transitions_are_logged_and_recorded() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let journal = Journal::default();

        machine.go_to_state(Tracer::new("A", &journal)).await.unwrap();
        machine.go_to_state(Tracer::new("B", &journal)).await.unwrap();

        assert!(logger.contains("[test] entering state 'A'"));
        assert!(logger.contains("[test] entering state 'B'"));
        assert_eq!(
            machine.history().get_path(),
            vec![None, Some("A"), Some("B")]
        );
    }

    #[tokio::test]
    async fn snapshot_reflects_machine() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        machine
            .go_to_state(Tracer::new("A", &Journal::default()))
            .await
            .unwrap();

        let snapshot = machine.snapshot();

        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.machine, "test");
        assert_eq!(snapshot.current_state.as_deref(), Some("A"));
        assert_eq!(snapshot.running_loops, 3);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test]
    async fn weak_handle_does_not_keep_machine_alive() {
        let scheduler = Arc::new(FrameScheduler::new());
        let logger = Arc::new(MemoryLogger::new());
        let machine = build_machine(&scheduler, &logger);
        let weak = machine.downgrade();

        assert!(weak.upgrade().is_some());
        drop(machine);
        assert!(weak.upgrade().is_none());
    }
}
