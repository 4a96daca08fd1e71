//! Builder for constructing state machines.

use crate::builder::error::BuildError;
use crate::core::{CancellationToken, TransitionHistory, DEFAULT_HISTORY_CAPACITY};
use crate::logging::{Logger, TracingLogger};
use crate::runtime::StateMachine;
use crate::scheduler::Scheduler;
use std::sync::Arc;

/// Builder for constructing state machines with a fluent API.
pub struct StateMachineBuilder {
    name: String,
    scheduler: Option<Arc<dyn Scheduler>>,
    logger: Option<Arc<dyn Logger>>,
    root: Option<CancellationToken>,
    history_capacity: usize,
}

impl StateMachineBuilder {
    pub fn new() -> Self {
        Self {
            name: "fsm".to_string(),
            scheduler: None,
            logger: None,
            root: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    /// Name used as the prefix of every log line.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the tick source (required).
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the logger. Defaults to [`TracingLogger`].
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Tie every activation's lifetime to `root`: cancelling it stops the
    /// tick loops of whatever state is current.
    pub fn root_token(mut self, root: CancellationToken) -> Self {
        self.root = Some(root);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Build the state machine.
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<StateMachine, BuildError> {
        let scheduler = self.scheduler.ok_or(BuildError::MissingScheduler)?;

        if self.name.trim().is_empty() {
            return Err(BuildError::EmptyName);
        }
        if self.history_capacity == 0 {
            return Err(BuildError::ZeroHistoryCapacity);
        }

        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger));
        Ok(StateMachine::from_parts(
            self.name,
            scheduler,
            logger,
            self.root,
            TransitionHistory::with_capacity(self.history_capacity),
        ))
    }
}

impl Default for StateMachineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::new()
    }
}
