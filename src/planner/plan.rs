//! Provisioning plan types and construction.
//!
//! This module compiles a configuration into an ordered list of engine
//! [`Step`]s and supports restricting a plan to selected steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::{ActionConfig, ActionKind, ConfigHasher, ConfigParser, ProvisionConfig, StepConfig};
use crate::engine::{Action, GuardedAction, PackageSet, Step, line_in_file, upload_file};
use crate::error::{ConfigError, HostprepError, PlanError, Result};
use crate::remote::Command;

/// What a run does after a failed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// End the run at the first failed step.
    #[default]
    StopOnFailure,
    /// Run every step and report failures at the end.
    ContinueOnFailure,
}

/// An ordered list of steps to run against one target.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Plan name.
    pub name: String,
    /// Fingerprint of the configuration the plan was built from.
    pub fingerprint: Option<String>,
    /// Failure policy.
    pub policy: FailurePolicy,
    /// Steps in execution order.
    pub steps: Vec<Step>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}

impl FailurePolicy {
    /// Returns the label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StopOnFailure => "stop on failure",
            Self::ContinueOnFailure => "continue on failure",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Plan {
    /// Creates a plan from already built steps.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            fingerprint: None,
            policy: FailurePolicy::default(),
            steps,
            created_at: Utc::now(),
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compiles a configuration into a plan.
    ///
    /// Local `file` sources are read here, relative to the parser's base
    /// path, so a missing source fails before any connection is made.
    ///
    /// # Errors
    ///
    /// Returns an error if a source file cannot be read.
    pub fn from_config(config: &ProvisionConfig, parser: &ConfigParser) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .map(|step| compile_step(step, parser))
            .collect::<Result<Vec<_>>>()?;

        debug!("Compiled plan '{}' with {} steps", config.name, steps.len());

        Ok(Self {
            name: config.name.clone(),
            fingerprint: Some(ConfigHasher::new().hash_config(config)),
            policy: config.policy,
            steps,
            created_at: Utc::now(),
        })
    }

    /// Restricts the plan to the named steps, keeping declaration order.
    ///
    /// An empty selection keeps every step.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStep` for a name the plan does not declare.
    pub fn select(&self, names: &[String]) -> std::result::Result<Self, PlanError> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        if let Some(unknown) = names.iter().find(|n| !self.steps.iter().any(|s| &s.name == *n)) {
            return Err(PlanError::UnknownStep { name: unknown.clone() });
        }

        Ok(Self {
            steps: self
                .steps
                .iter()
                .filter(|s| names.contains(&s.name))
                .cloned()
                .collect(),
            ..self.clone()
        })
    }

    /// Returns the step names in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the number of actions across all steps.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.steps.iter().map(|s| s.actions.len()).sum()
    }
}

fn compile_step(config: &StepConfig, parser: &ConfigParser) -> Result<Step> {
    let actions = config
        .actions
        .iter()
        .map(|action| compile_action(action, parser))
        .collect::<Result<Vec<_>>>()?;

    Ok(Step {
        name: config.name.clone(),
        description: config.description.clone(),
        mode: config.mode,
        context: config.context.clone(),
        actions,
    })
}

fn compile_action(config: &ActionConfig, parser: &ConfigParser) -> Result<Action> {
    let description = config.describe();

    let guarded = match &config.kind {
        ActionKind::Command { probe, apply } => GuardedAction {
            description,
            probe: probe.as_deref().map(Command::new),
            apply: apply.to_vec().into_iter().map(Command::new).collect(),
        },
        ActionKind::LineInFile { path, line } => line_in_file(path, line).describe(description),
        ActionKind::File {
            source,
            dest,
            mode,
            overwrite,
        } => {
            let path = parser.resolve(source);
            let content = std::fs::read(&path).map_err(|e| {
                HostprepError::Config(ConfigError::SourceUnreadable {
                    path: path.clone(),
                    message: e.to_string(),
                })
            })?;
            upload_file(dest, &content, mode.as_deref(), *overwrite).describe(description)
        }
        ActionKind::Packages {
            packages,
            check,
            install,
        } => {
            let set = PackageSet::new(description, packages.clone(), check.clone(), install.clone())
                .with_context(config.context.clone());
            return Ok(Action::Packages(set));
        }
    };

    Ok(Action::Guarded(guarded.with_context(&config.context)))
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan '{}' ({}, {} steps)", self.name, self.policy, self.steps.len())?;
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "  {}. {}", i + 1, step.name)?;
            if let Some(description) = &step.description {
                write!(f, " - {description}")?;
            }
            writeln!(f)?;
            for action in &step.actions {
                writeln!(f, "       {}", action.description())?;
            }
        }
        Ok(())
    }
}
