//! Remote execution module.
//!
//! This module provides everything needed to run commands on a target:
//! command values, shell rendering, the transport boundary, the SSH and
//! local transports, and the executor that binds a session to its target.

mod command;
mod executor;
mod local;
pub mod shell;
mod ssh;
mod target;
mod transport;

pub use command::{Command, CommandContext, ExecutionResult};
pub use executor::RemoteExecutor;
pub use local::{LocalConnector, LocalTransport};
pub use ssh::{SshConnector, SshTransport};
pub use target::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SSH_PORT, KnownHostsPolicy,
    Target, TransportKind,
};
pub use transport::{Connector, Transport, connector_for};

#[cfg(test)]
pub use transport::MockConnector;
