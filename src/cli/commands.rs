//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::planner::FailurePolicy;

/// hostprep - Idempotent provisioning of a single host over SSH.
#[derive(Parser, Debug)]
#[command(name = "hostprep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "HOSTPREP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter configuration.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the ordered steps without connecting.
    Plan {
        /// Restrict to these steps.
        #[arg(long, value_name = "STEP", num_args = 1..)]
        only: Vec<String>,
    },

    /// Run the plan against the target.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Run every step even after a failure.
        #[arg(long, conflicts_with = "stop_on_failure")]
        continue_on_failure: bool,

        /// Stop at the first failed step.
        #[arg(long)]
        stop_on_failure: bool,

        /// Restrict to these steps.
        #[arg(long, value_name = "STEP", num_args = 1..)]
        only: Vec<String>,
    },

    /// Inspect or clear the target lock.
    Lock {
        /// Lock subcommand.
        #[command(subcommand)]
        command: LockCommands,
    },
}

/// Target lock subcommands.
#[derive(Subcommand, Debug)]
pub enum LockCommands {
    /// Show who holds the lock.
    Show,

    /// Remove the lock.
    Release {
        /// Remove it even if it has not expired.
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Resolves the failure policy of an `apply` from its flags.
#[must_use]
pub const fn policy_override(continue_on_failure: bool, stop_on_failure: bool) -> Option<FailurePolicy> {
    if continue_on_failure {
        Some(FailurePolicy::ContinueOnFailure)
    } else if stop_on_failure {
        Some(FailurePolicy::StopOnFailure)
    } else {
        None
    }
}
