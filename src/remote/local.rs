//! Local shell transport, for provisioning the machine hostprep runs on.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tracing::debug;

use crate::error::TransportError;

use super::command::{Command, ExecutionResult};
use super::shell;
use super::target::Target;
use super::transport::{Connector, Transport, feed_stdin};

/// Opens local "sessions".
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalConnector;

/// Runs commands through the local `sh`.
#[derive(Debug)]
pub struct LocalTransport {
    destination: String,
}

impl LocalConnector {
    /// Creates a new local connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, TransportError> {
        debug!("Using local shell for {}", target.host);
        Ok(Box::new(LocalTransport {
            destination: target.destination(),
        }))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, command: &Command) -> Result<ExecutionResult, TransportError> {
        let line = shell::render(command);
        let started = Instant::now();

        let mut process = tokio::process::Command::new("sh");
        process
            .arg("-c")
            .arg(&line)
            .stdin(if command.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group: a Ctrl-C on the terminal must not reach a
        // command that is already running.
        #[cfg(unix)]
        process.process_group(0);

        let mut child = process.spawn().map_err(|e| TransportError::Spawn {
            message: e.to_string(),
        })?;

        let stdin = child.stdin.take();
        let (fed, output) = tokio::join!(
            feed_stdin(stdin, command.stdin.as_deref()),
            child.wait_with_output()
        );

        let output = output.map_err(|e| TransportError::Spawn {
            message: e.to_string(),
        })?;
        fed.map_err(|e| TransportError::Spawn {
            message: format!("Failed to write command input: {e}"),
        })?;

        Ok(ExecutionResult::from_output(&output, started.elapsed()))
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}
