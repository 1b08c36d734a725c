//! CLI module for hostprep.
//!
//! This module provides the command-line interface for validating,
//! planning and applying provisioning runs.

mod commands;
mod output;

pub use commands::{Cli, Commands, LockCommands, OutputFormat, policy_override};
pub use output::{ConsoleReporter, OutputFormatter};
