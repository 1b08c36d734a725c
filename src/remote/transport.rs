//! Transport boundary.
//!
//! The engine only needs one capability from a transport: run a command on
//! the target, as a given user, with a given environment. Sessions are
//! opened by a [`Connector`] and closed exactly once by consuming the
//! [`Transport`] box.

use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

use super::command::{Command, ExecutionResult};
use super::local::LocalConnector;
use super::ssh::SshConnector;
use super::target::{Target, TransportKind};

/// An open session to a target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs a command and captures its result.
    ///
    /// A non-zero exit status is reported through
    /// [`ExecutionResult::succeeded`], never as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session is unusable or was lost.
    async fn execute(&self, command: &Command) -> Result<ExecutionResult, TransportError>;

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session did not shut down cleanly.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;

    /// Describes where commands run, for logs.
    fn destination(&self) -> &str;
}

/// Opens sessions to targets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be reached.
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, TransportError>;
}

/// Returns the connector matching a transport kind.
#[must_use]
pub fn connector_for(kind: TransportKind) -> Box<dyn Connector> {
    match kind {
        TransportKind::Ssh => Box::new(SshConnector::new()),
        TransportKind::Local => Box::new(LocalConnector::new()),
    }
}

/// Writes a command's input to its standard input, then closes the pipe.
///
/// A command that exits without reading everything (`cmp` against a
/// missing file) closes its end early; that is not an error.
pub(crate) async fn feed_stdin<W>(stdin: Option<W>, input: Option<&[u8]>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return Ok(());
    };

    match stdin.write_all(input).await {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e),
        Ok(()) => match stdin.shutdown().await {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        },
    }
}
