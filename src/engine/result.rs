//! Outcomes of guarded actions and steps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an action or a whole step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The desired state was absent and the apply succeeded.
    Applied,
    /// The probe reported the desired state already present.
    AlreadySatisfied,
    /// The probe errored, the session was lost, or the apply failed.
    Failed,
}

/// Why an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The session could not be used (transport-level).
    Connection,
    /// The probe itself failed unexpectedly.
    Probe,
    /// The apply ran and reported failure.
    Apply,
}

/// Result of one guarded action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// What the action does.
    pub description: String,
    /// Outcome of the action.
    pub outcome: Outcome,
    /// Failure reason, set iff `outcome` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Human-readable detail (failure summary or what was changed).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Exit code of the command that decided the outcome, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// Step name.
    pub name: String,
    /// Aggregated outcome.
    pub outcome: Outcome,
    /// Reason of the first failed action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Detail of the first failed action, or a short summary.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Per-action results, in execution order.
    pub actions: Vec<ActionResult>,
    /// Wall-clock time of the step.
    pub duration_ms: u64,
}

impl Outcome {
    /// Returns the lowercase label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::AlreadySatisfied => "already satisfied",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FailureKind {
    /// Returns the label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection error",
            Self::Probe => "probe error",
            Self::Apply => "apply failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ActionResult {
    /// An action whose apply ran and succeeded.
    #[must_use]
    pub fn applied(description: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            outcome: Outcome::Applied,
            failure: None,
            detail: detail.into(),
            exit_code: Some(0),
        }
    }

    /// An action whose probe found the desired state.
    #[must_use]
    pub fn satisfied(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            outcome: Outcome::AlreadySatisfied,
            failure: None,
            detail: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed action.
    #[must_use]
    pub fn failed(
        description: impl Into<String>,
        kind: FailureKind,
        detail: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            description: description.into(),
            outcome: Outcome::Failed,
            failure: Some(kind),
            detail: detail.into(),
            exit_code,
        }
    }

    /// Returns true if the action failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

impl StepResult {
    /// Aggregates action results into a step result.
    ///
    /// Failed if any action failed, else Applied if any action applied,
    /// else AlreadySatisfied (which includes a step with no actions).
    #[must_use]
    pub fn from_actions(name: impl Into<String>, actions: Vec<ActionResult>, duration_ms: u64) -> Self {
        let first_failure = actions.iter().find(|a| a.is_failed());

        let (outcome, failure, detail) = if let Some(failed) = first_failure {
            (
                Outcome::Failed,
                failed.failure,
                format!("{}: {}", failed.description, failed.detail),
            )
        } else if actions.iter().any(|a| a.outcome == Outcome::Applied) {
            let applied = actions.iter().filter(|a| a.outcome == Outcome::Applied).count();
            (Outcome::Applied, None, format!("{applied}/{} actions applied", actions.len()))
        } else {
            (Outcome::AlreadySatisfied, None, String::new())
        };

        Self {
            name: name.into(),
            outcome,
            failure,
            detail,
            actions,
            duration_ms,
        }
    }

    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }

    /// Returns true if the step changed the target.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.actions.iter().any(|a| a.outcome == Outcome::Applied)
    }
}
