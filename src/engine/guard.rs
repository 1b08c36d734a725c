//! The check-then-act idiom as a value.
//!
//! A [`GuardedAction`] pairs a read-only probe with the commands that
//! establish the desired state. [`IdempotencyGuard`] runs the probe and only
//! runs the apply commands when the state is absent.

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::remote::{Command, CommandContext, ExecutionResult, RemoteExecutor};

use super::result::{ActionResult, FailureKind};

/// Exit code of a command that exists but is not executable.
const NOT_EXECUTABLE: i32 = 126;

/// Exit code of a command that does not exist.
const NOT_FOUND: i32 = 127;

/// A probe, the apply commands it gates, and a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedAction {
    /// What the action establishes, for reports.
    pub description: String,
    /// Read-only check; `None` means the apply always runs.
    pub probe: Option<Command>,
    /// Commands establishing the desired state, run in order.
    pub apply: Vec<Command>,
}

/// What a probe said about the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The desired state is present.
    Satisfied,
    /// The desired state is absent.
    NotSatisfied,
    /// The probe could not answer (the probe command itself is broken).
    Errored(ExecutionResult),
}

/// Runs guarded actions through an executor.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyGuard<'a> {
    executor: RemoteExecutor<'a>,
}

impl GuardedAction {
    /// Creates an action with a probe and a single apply command.
    #[must_use]
    pub fn new(description: impl Into<String>, probe: impl Into<Command>, apply: impl Into<Command>) -> Self {
        Self {
            description: description.into(),
            probe: Some(probe.into()),
            apply: vec![apply.into()],
        }
    }

    /// Creates an action that always applies.
    #[must_use]
    pub fn unguarded(description: impl Into<String>, apply: Vec<Command>) -> Self {
        Self {
            description: description.into(),
            probe: None,
            apply,
        }
    }

    /// Appends another apply command.
    #[must_use]
    pub fn then(mut self, command: impl Into<Command>) -> Self {
        self.apply.push(command.into());
        self
    }

    /// Sets `context` on every command where the command leaves it unset.
    #[must_use]
    pub fn with_context(mut self, context: &CommandContext) -> Self {
        self.probe = self.probe.map(|p| p.with_context(context));
        self.apply = self.apply.iter().map(|c| c.with_context(context)).collect();
        self
    }

    /// Replaces the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl ProbeVerdict {
    /// Classifies a finished probe.
    ///
    /// Exit 0 is satisfied. Exit 126/127 or death by signal means the probe
    /// could not run. Any other status is a plain "no".
    #[must_use]
    pub fn classify(result: ExecutionResult) -> Self {
        match result.exit_code {
            Some(0) => Self::Satisfied,
            Some(NOT_EXECUTABLE | NOT_FOUND) | None => Self::Errored(result),
            Some(_) => Self::NotSatisfied,
        }
    }
}

impl<'a> IdempotencyGuard<'a> {
    /// Creates a guard running commands through `executor`.
    #[must_use]
    pub const fn new(executor: RemoteExecutor<'a>) -> Self {
        Self { executor }
    }

    /// Runs `apply` only if `probe` does not succeed.
    pub async fn apply_if_needed(&self, probe: &Command, apply: &Command) -> ActionResult {
        let action = GuardedAction {
            description: apply.script.clone(),
            probe: Some(probe.clone()),
            apply: vec![apply.clone()],
        };
        self.run(&action, &CommandContext::default()).await
    }

    /// Runs a guarded action with `context` layered under each command.
    pub async fn run(&self, action: &GuardedAction, context: &CommandContext) -> ActionResult {
        let description = action.description.as_str();

        if let Some(probe) = &action.probe {
            match self.check(&probe.with_context(context)).await {
                Ok(ProbeVerdict::Satisfied) => {
                    debug!("{description}: already satisfied");
                    return ActionResult::satisfied(description);
                }
                Ok(ProbeVerdict::NotSatisfied) => {
                    debug!("{description}: not satisfied, applying");
                }
                Ok(ProbeVerdict::Errored(result)) => {
                    warn!("{description}: probe errored ({})", result.summary());
                    return ActionResult::failed(description, FailureKind::Probe, result.summary(), result.exit_code);
                }
                Err(failure) => return failure.into_result(description),
            }
        }

        match self.apply_all(&action.apply, context).await {
            Ok(()) => ActionResult::applied(description, ""),
            Err(failure) => failure.into_result(description),
        }
    }

    /// Runs a probe and classifies it.
    ///
    /// # Errors
    ///
    /// Returns a connection failure if the session is lost.
    pub(crate) async fn check(&self, probe: &Command) -> Result<ProbeVerdict, ActionFailure> {
        self.executor
            .execute(probe)
            .await
            .map(ProbeVerdict::classify)
            .map_err(|e| ActionFailure::transport(&e, FailureKind::Probe))
    }

    /// Runs apply commands in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first command that did not succeed.
    pub(crate) async fn apply_all(&self, commands: &[Command], context: &CommandContext) -> Result<(), ActionFailure> {
        for command in commands {
            let result = self
                .executor
                .execute(&command.with_context(context))
                .await
                .map_err(|e| ActionFailure::transport(&e, FailureKind::Apply))?;

            if !result.succeeded {
                return Err(ActionFailure {
                    kind: FailureKind::Apply,
                    detail: result.summary(),
                    exit_code: result.exit_code,
                });
            }
        }
        Ok(())
    }
}

/// A failure before it is attached to an action description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActionFailure {
    pub kind: FailureKind,
    pub detail: String,
    pub exit_code: Option<i32>,
}

impl ActionFailure {
    /// A command that could not be started fails at `stage`; anything
    /// else means the session is gone.
    fn transport(error: &TransportError, stage: FailureKind) -> Self {
        warn!("{error}");
        let kind = match error {
            TransportError::Spawn { .. } => stage,
            TransportError::ConnectFailed { .. } | TransportError::Disconnected { .. } => FailureKind::Connection,
        };
        Self {
            kind,
            detail: error.to_string(),
            exit_code: None,
        }
    }

    pub(crate) fn into_result(self, description: &str) -> ActionResult {
        ActionResult::failed(description, self.kind, self.detail, self.exit_code)
    }
}
