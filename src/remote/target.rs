//! Target host description.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::TargetConfig;
use crate::lock::LockSettings;

use super::command::CommandContext;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default number of session acquisition attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// How commands reach the target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Over SSH.
    #[default]
    Ssh,
    /// Through a local `sh`.
    Local,
}

/// Host key verification policy for SSH targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KnownHostsPolicy {
    /// Refuse unknown hosts.
    Strict,
    /// Accept and record unknown hosts, refuse changed keys.
    #[default]
    Add,
    /// Accept any host key.
    Accept,
}

/// The host a run operates against, with its credentials and context.
///
/// Built once per run and never mutated while the run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host name or address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user (the connecting credential).
    pub user: Option<String>,
    /// Private key used to authenticate.
    pub identity_file: Option<PathBuf>,
    /// Host key verification policy.
    pub known_hosts: KnownHostsPolicy,
    /// Timeout for establishing the session.
    pub connect_timeout: Duration,
    /// How many times session acquisition is attempted.
    pub connect_attempts: u32,
    /// Transport used to reach the host.
    pub transport: TransportKind,
    /// Outermost command context (acting-as-user and environment overlay).
    pub context: CommandContext,
    /// Exclusive lock settings.
    pub lock: LockSettings,
}

impl Target {
    /// Creates an SSH target with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: None,
            identity_file: None,
            known_hosts: KnownHostsPolicy::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            transport: TransportKind::Ssh,
            context: CommandContext::default(),
            lock: LockSettings::default(),
        }
    }

    /// Creates a target for the local machine.
    #[must_use]
    pub fn local() -> Self {
        Self {
            transport: TransportKind::Local,
            ..Self::new("localhost")
        }
    }

    /// Builds a target from its configuration section.
    #[must_use]
    pub fn from_config(config: &TargetConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            identity_file: config
                .identity_file
                .as_deref()
                .map(crate::config::expand_home),
            known_hosts: config.known_hosts,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            connect_attempts: config.connect_attempts.max(1),
            transport: config.transport,
            context: CommandContext {
                as_user: config.as_user.clone(),
                env: config.env.clone(),
                workdir: None,
            },
            lock: config.lock.clone(),
        }
    }

    /// Sets the login user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the outermost command context.
    #[must_use]
    pub fn with_context(mut self, context: CommandContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the lock settings.
    #[must_use]
    pub fn with_lock(mut self, lock: LockSettings) -> Self {
        self.lock = lock;
        self
    }

    /// Disables the exclusive target lock.
    #[must_use]
    pub fn without_lock(mut self) -> Self {
        self.lock.enabled = false;
        self
    }

    /// Returns `user@host:port` (or `local`).
    #[must_use]
    pub fn destination(&self) -> String {
        match self.transport {
            TransportKind::Local => String::from("local"),
            TransportKind::Ssh => match &self.user {
                Some(user) => format!("{user}@{}:{}", self.host, self.port),
                None => format!("{}:{}", self.host, self.port),
            },
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.destination())
    }
}
