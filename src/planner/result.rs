//! Run states and plan results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::engine::{Outcome, StepResult};

use super::plan::FailurePolicy;

/// Lifecycle of a plan run.
///
/// `Pending -> Running -> {Completed, Aborted, Cancelled}`. `Aborted` only
/// happens under [`FailurePolicy::StopOnFailure`] after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started.
    Pending,
    /// Steps are being executed.
    Running,
    /// Every step was executed.
    Completed,
    /// Stopped after a failed step.
    Aborted,
    /// Stopped on request before a step.
    Cancelled,
}

/// Ordered ledger of the steps a run executed.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    /// Plan name.
    pub plan: String,
    /// Where the plan ran.
    pub target: String,
    /// Fingerprint of the applied configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Failure policy of the run.
    pub policy: FailurePolicy,
    /// Final (or current) state.
    pub state: RunState,
    /// One entry per executed step, in execution order.
    pub steps: Vec<StepResult>,
    /// Number of steps the plan declared.
    pub declared: usize,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Returns true for `Completed`, `Aborted` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Cancelled)
    }

    /// Returns true if `next` is a legal successor.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Completed | Self::Aborted | Self::Cancelled)
        )
    }

    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlanResult {
    /// Creates a pending result.
    #[must_use]
    pub fn new(
        plan: impl Into<String>,
        target: impl Into<String>,
        fingerprint: Option<String>,
        policy: FailurePolicy,
        declared: usize,
    ) -> Self {
        Self {
            plan: plan.into(),
            target: target.into(),
            fingerprint,
            policy,
            state: RunState::Pending,
            steps: Vec::new(),
            declared,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Moves to `next`, ignoring illegal transitions.
    ///
    /// Returns true if the state changed.
    pub fn transition(&mut self, next: RunState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!("Ignoring run state change {} -> {}", self.state, next);
            return false;
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    /// Records an executed step.
    pub fn record(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    /// Returns true if the run completed with no failed step.
    #[must_use]
    pub fn success(&self) -> bool {
        self.state == RunState::Completed && !self.has_failures()
    }

    /// Returns true if any executed step failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(StepResult::is_failed)
    }

    /// Returns the failed steps.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.is_failed())
    }

    /// Counts executed steps with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    /// Number of declared steps that never ran.
    #[must_use]
    pub fn not_run(&self) -> usize {
        self.declared.saturating_sub(self.steps.len())
    }

    /// Wall-clock time of the run so far.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// The outcomes of the executed steps, in order.
    #[must_use]
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.steps.iter().map(|s| s.outcome).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ActionResult, FailureKind};

    fn result() -> PlanResult {
        PlanResult::new("box", "local", None, FailurePolicy::ContinueOnFailure, 3)
    }

    #[test]
    fn test_state_machine() {
        let mut run = result();
        assert!(!run.transition(RunState::Completed));
        assert_eq!(run.state, RunState::Pending);

        assert!(run.transition(RunState::Running));
        assert!(run.transition(RunState::Cancelled));
        assert!(run.finished_at.is_some());
        assert!(!run.transition(RunState::Running));
    }

    #[test]
    fn test_success_requires_completion_without_failures() {
        let mut run = result();
        run.transition(RunState::Running);
        run.record(StepResult::from_actions("a", vec![ActionResult::applied("x", "")], 1));
        run.record(StepResult::from_actions(
            "b",
            vec![ActionResult::failed("y", FailureKind::Apply, "exit 1", Some(1))],
            1,
        ));
        run.transition(RunState::Completed);

        assert!(!run.success());
        assert_eq!(run.outcomes(), vec![Outcome::Applied, Outcome::Failed]);
        assert_eq!(run.failed_steps().count(), 1);
        assert_eq!(run.not_run(), 1);
    }
}
