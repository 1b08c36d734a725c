//! Steps: named units of work made of guarded actions.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::remote::{CommandContext, RemoteExecutor};

use super::guard::{GuardedAction, IdempotencyGuard};
use super::packages::PackageSet;
use super::result::{ActionResult, StepResult};

/// How a step reacts to a failed action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// The first failed action aborts the remaining ones.
    #[default]
    AllOrNothing,
    /// Every action runs; failures are collected.
    BestEffort,
}

/// One unit of work inside a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A probe-gated apply.
    Guarded(GuardedAction),
    /// A batched package check and install.
    Packages(PackageSet),
}

/// A named, ordered list of actions sharing a command context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Unique step name.
    pub name: String,
    /// Optional human description.
    pub description: Option<String>,
    /// Failure handling inside the step.
    pub mode: StepMode,
    /// Context applied to every action, under the action's own.
    pub context: CommandContext,
    /// Actions in declaration order.
    pub actions: Vec<Action>,
}

impl StepMode {
    /// Returns the snake_case label used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllOrNothing => "all_or_nothing",
            Self::BestEffort => "best_effort",
        }
    }
}

impl Action {
    /// Returns the action description.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Guarded(action) => &action.description,
            Self::Packages(set) => &set.description,
        }
    }

    async fn run(&self, guard: &IdempotencyGuard<'_>, context: &CommandContext) -> ActionResult {
        match self {
            Self::Guarded(action) => guard.run(action, context).await,
            Self::Packages(set) => set.run(guard, context).await,
        }
    }
}

impl From<GuardedAction> for Action {
    fn from(action: GuardedAction) -> Self {
        Self::Guarded(action)
    }
}

impl From<PackageSet> for Action {
    fn from(set: PackageSet) -> Self {
        Self::Packages(set)
    }
}

impl Step {
    /// Creates an all-or-nothing step with no actions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            mode: StepMode::default(),
            context: CommandContext::default(),
            actions: Vec::new(),
        }
    }

    /// Sets the failure mode.
    #[must_use]
    pub const fn mode(mut self, mode: StepMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the step context.
    #[must_use]
    pub fn context(mut self, context: CommandContext) -> Self {
        self.context = context;
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn action(mut self, action: impl Into<Action>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Runs the step's actions in order.
    ///
    /// Never fails: every problem, including a lost session, ends up in the
    /// returned [`StepResult`].
    pub async fn run(&self, executor: &RemoteExecutor<'_>) -> StepResult {
        let started = Instant::now();
        let guard = IdempotencyGuard::new(*executor);
        let mut results = Vec::with_capacity(self.actions.len());

        debug!("Step '{}': {} actions ({:?})", self.name, self.actions.len(), self.mode);

        for action in &self.actions {
            let result = action.run(&guard, &self.context).await;
            let failed = result.is_failed();
            results.push(result);

            if failed && self.mode == StepMode::AllOrNothing {
                let skipped = self.actions.len() - results.len();
                if skipped > 0 {
                    warn!("Step '{}': skipping {skipped} remaining actions", self.name);
                }
                break;
            }
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = StepResult::from_actions(&self.name, results, duration_ms);
        info!("Step '{}': {}", self.name, result.outcome);
        result
    }
}
