//! SSH transport.
//!
//! Uses the system `ssh` client with a multiplexed master connection: the
//! session is established once in [`SshConnector::connect`] and every
//! command reuses it until [`Transport::close`] tears the master down.
//! Commands talk to the master over its control socket directly, so no
//! per-command `ssh` client exists for a terminal Ctrl-C to kill.

use async_trait::async_trait;
use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::TransportError;

use super::command::{Command, ExecutionResult};
use super::shell;
use super::target::{KnownHostsPolicy, Target};
use super::transport::{Connector, Transport, feed_stdin};

/// Keepalive interval so a dead peer is noticed mid-command.
const SERVER_ALIVE_INTERVAL_SECS: u64 = 15;

/// Opens SSH sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

/// An open SSH session.
pub struct SshTransport {
    /// Multiplexed master session.
    session: Session,
    /// `user@host:port` for logs and errors.
    destination: String,
}

impl SshConnector {
    /// Creates a new SSH connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl From<KnownHostsPolicy> for KnownHosts {
    fn from(policy: KnownHostsPolicy) -> Self {
        match policy {
            KnownHostsPolicy::Strict => Self::Strict,
            KnownHostsPolicy::Add => Self::Add,
            KnownHostsPolicy::Accept => Self::Accept,
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, TransportError> {
        let destination = target.destination();
        info!("Opening SSH session to {destination}");

        let mut builder = SessionBuilder::default();
        builder
            .port(target.port)
            .connect_timeout(target.connect_timeout)
            .server_alive_interval(Duration::from_secs(SERVER_ALIVE_INTERVAL_SECS))
            .known_hosts_check(target.known_hosts.into());

        if let Some(user) = &target.user {
            builder.user(user.clone());
        }
        if let Some(key) = &target.identity_file {
            builder.keyfile(key);
        }

        let session = builder
            .connect_mux(&target.host)
            .await
            .map_err(|e| TransportError::connect(&destination, e.to_string()))?;

        debug!("SSH session to {destination} established");

        Ok(Box::new(SshTransport {
            session,
            destination,
        }))
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn execute(&self, command: &Command) -> Result<ExecutionResult, TransportError> {
        let line = shell::render(command);
        let started = Instant::now();
        let lost = |e: &dyn std::fmt::Display| TransportError::disconnected(&self.destination, e.to_string());

        let mut child = self
            .session
            .raw_command(&line)
            .stdin(if command.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .await
            .map_err(|e| lost(&e))?;

        let stdin = child.stdin().take();
        let (fed, output) = tokio::join!(
            feed_stdin(stdin, command.stdin.as_deref()),
            child.wait_with_output()
        );

        let output = output.map_err(|e| lost(&e))?;
        fed.map_err(|e| lost(&e))?;

        Ok(ExecutionResult::from_output(&output, started.elapsed()))
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let Self {
            session,
            destination,
        } = *self;

        debug!("Closing SSH session to {destination}");
        session
            .close()
            .await
            .map_err(|e| TransportError::disconnected(&destination, e.to_string()))
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}
