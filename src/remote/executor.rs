//! Remote executor: a transport bound to the target it was opened for.

use tracing::{debug, trace};

use crate::error::TransportError;

use super::command::{Command, ExecutionResult};
use super::target::Target;
use super::transport::Transport;

/// Runs commands against one target over an already open session.
///
/// The target's context (acting-as-user, environment overlay) is applied
/// underneath whatever the command itself sets.
#[derive(Clone, Copy)]
pub struct RemoteExecutor<'a> {
    /// Open session.
    transport: &'a dyn Transport,
    /// Target the session belongs to.
    target: &'a Target,
}

impl<'a> RemoteExecutor<'a> {
    /// Creates an executor over an open session.
    #[must_use]
    pub const fn new(transport: &'a dyn Transport, target: &'a Target) -> Self {
        Self { transport, target }
    }

    /// Returns the target.
    #[must_use]
    pub const fn target(&self) -> &'a Target {
        self.target
    }

    /// Returns where commands run.
    #[must_use]
    pub fn destination(&self) -> &str {
        self.transport.destination()
    }

    /// Executes one command.
    ///
    /// # Errors
    ///
    /// Returns an error only when the session is lost; a failing command is
    /// reported through `succeeded: false`.
    pub async fn execute(&self, command: &Command) -> Result<ExecutionResult, TransportError> {
        let command = command.with_context(&self.target.context);
        debug!("[{}] $ {}", self.transport.destination(), command);

        let result = self.transport.execute(&command).await?;

        debug!(
            "[{}] exit {:?} in {}ms",
            self.transport.destination(),
            result.exit_code,
            result.duration.as_millis()
        );
        if !result.stdout.is_empty() {
            trace!("stdout: {}", result.stdout.trim_end());
        }
        if !result.stderr.is_empty() {
            trace!("stderr: {}", result.stderr.trim_end());
        }

        Ok(result)
    }
}

impl std::fmt::Debug for RemoteExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("destination", &self.transport.destination())
            .finish_non_exhaustive()
    }
}
