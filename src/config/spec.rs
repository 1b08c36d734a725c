//! Configuration file types.
//!
//! This module defines the structs that map to the `hostprep.yaml` file:
//! one target, a failure policy, and an ordered list of steps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::StepMode;
use crate::lock::LockSettings;
use crate::planner::FailurePolicy;
use crate::remote::{
    CommandContext, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SSH_PORT,
    KnownHostsPolicy, TransportKind,
};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Name of the provisioning plan.
    pub name: String,
    /// What happens after a failed step.
    #[serde(default)]
    pub policy: FailurePolicy,
    /// Host to provision.
    pub target: TargetConfig,
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Target host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    /// Host name or address.
    #[serde(default)]
    pub host: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    #[serde(default)]
    pub user: Option<String>,
    /// Private key file (`~` is expanded locally).
    #[serde(default)]
    pub identity_file: Option<String>,
    /// Host key verification policy.
    #[serde(default)]
    pub known_hosts: KnownHostsPolicy,
    /// Session establishment timeout.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Session acquisition attempts.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// How commands reach the host.
    #[serde(default)]
    pub transport: TransportKind,
    /// Account every command runs as unless overridden.
    #[serde(default)]
    pub as_user: Option<String>,
    /// Environment overlay for every command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Exclusive lock settings.
    #[serde(default)]
    pub lock: LockSettings,
}

/// Configuration for a single step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepConfig {
    /// Unique step name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Failure handling inside the step.
    #[serde(default)]
    pub mode: StepMode,
    /// Context shared by the step's actions.
    #[serde(flatten)]
    pub context: CommandContext,
    /// Actions in declaration order.
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// Configuration for a single action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionConfig {
    /// Description shown in reports; derived from the action when absent.
    #[serde(default)]
    pub description: Option<String>,
    /// Context of this action, overriding the step's.
    #[serde(flatten)]
    pub context: CommandContext,
    /// What the action does.
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// Action kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Arbitrary shell commands behind an optional probe.
    Command {
        /// Read-only check; the apply commands run only if it fails.
        #[serde(default)]
        probe: Option<String>,
        /// One command or a list run in order.
        apply: CommandList,
    },
    /// Ensure a line is present in a file.
    LineInFile {
        /// Remote file path.
        path: String,
        /// Exact line.
        line: String,
    },
    /// Upload a local file.
    File {
        /// Local source path, relative to the configuration file.
        source: String,
        /// Remote destination path.
        dest: String,
        /// Optional `chmod` mode, e.g. `"600"`.
        #[serde(default)]
        mode: Option<String>,
        /// Rewrite the destination when its content differs.
        #[serde(default)]
        overwrite: bool,
    },
    /// Install missing packages in one batch.
    Packages {
        /// Package names.
        packages: Vec<String>,
        /// Check template containing `{package}`.
        check: String,
        /// Install template containing `{packages}`.
        install: String,
    },
}

/// One command or a list of commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandList {
    /// A single command.
    One(String),
    /// Several commands run in order.
    Many(Vec<String>),
}

impl ActionConfig {
    /// Returns the configured description or one derived from the action.
    #[must_use]
    pub fn describe(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.kind {
            ActionKind::Command { apply, .. } => apply.first().unwrap_or_default().to_string(),
            ActionKind::LineInFile { path, .. } => format!("line in {path}"),
            ActionKind::File { dest, .. } => format!("file {dest}"),
            ActionKind::Packages { packages, .. } => format!("packages {}", packages.join(" ")),
        }
    }
}

impl CommandList {
    /// Returns the commands as a slice-backed vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(command) => vec![command.clone()],
            Self::Many(commands) => commands.clone(),
        }
    }

    /// Returns the first command.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(command) => Some(command),
            Self::Many(commands) => commands.first().map(String::as_str),
        }
    }

    /// Returns true if there is no command.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(command) => command.trim().is_empty(),
            Self::Many(commands) => commands.iter().all(|c| c.trim().is_empty()),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            user: None,
            identity_file: None,
            known_hosts: KnownHostsPolicy::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_attempts: default_connect_attempts(),
            transport: TransportKind::default(),
            as_user: None,
            env: BTreeMap::new(),
            lock: LockSettings::default(),
        }
    }
}

const fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kinds_and_context() {
        let yaml = r#"
description: rbenv for deploy
kind: command
probe: test -d ~/.rbenv
apply:
  - git clone https://github.com/rbenv/rbenv.git ~/.rbenv
  - git clone https://github.com/rbenv/ruby-build.git ~/.rbenv/plugins/ruby-build
as_user: deploy
env:
  PATH: "~/.rbenv/bin:$PATH"
"#;
        let action: ActionConfig = serde_yaml::from_str(yaml).expect("valid action");

        assert_eq!(action.context.as_user.as_deref(), Some("deploy"));
        assert_eq!(action.context.env["PATH"], "~/.rbenv/bin:$PATH");
        match &action.kind {
            ActionKind::Command { probe, apply } => {
                assert_eq!(probe.as_deref(), Some("test -d ~/.rbenv"));
                assert_eq!(apply.to_vec().len(), 2);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_single_apply_and_derived_description() {
        let action: ActionConfig =
            serde_yaml::from_str("kind: command\napply: apt-get update").expect("valid action");

        assert_eq!(action.describe(), "apt-get update");
        assert!(action.context.is_empty());

        let file: ActionConfig =
            serde_yaml::from_str("kind: file\nsource: files/vimrc\ndest: ~/.vimrc").expect("valid action");
        assert_eq!(file.describe(), "file ~/.vimrc");
    }

    #[test]
    fn test_target_defaults() {
        let target: TargetConfig = serde_yaml::from_str("host: 10.0.0.5").expect("valid target");

        assert_eq!(target.port, 22);
        assert_eq!(target.connect_attempts, 3);
        assert_eq!(target.transport, TransportKind::Ssh);
        assert!(target.lock.enabled);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: Result<ActionConfig, _> = serde_yaml::from_str("kind: template\npath: x");
        assert!(result.is_err());
    }
}
