// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # hostprep
//!
//! Idempotent provisioning of a single host over SSH.
//!
//! ## Overview
//!
//! A run executes an ordered list of named steps against one target. Every
//! action inside a step is a read-only probe followed by the commands that
//! make it true, and those commands only run when the probe fails. Running
//! the same plan twice leaves the host unchanged the second time.
//!
//! - Remote commands never raise on a non-zero exit; the exit code is data
//! - Only an unreachable host or a lost session is a transport error
//! - Each step reports `applied`, `already_satisfied` or `failed`
//! - A plan stops at the first failed step, or continues, per its policy
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and fingerprinting
//! - [`remote`]: Commands, targets, SSH and local transports, remote executor
//! - [`engine`]: Idempotency guard, guarded actions, package batches, steps
//! - [`planner`]: Plans, the plan executor and run results
//! - [`lock`]: Exclusive lock held on the target during a run
//! - [`report`]: Progress reporting
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: workstation
//! target:
//!   host: 10.0.0.5
//!   user: deploy
//!
//! steps:
//!   - name: locale
//!     as_user: root
//!     actions:
//!       - kind: command
//!         probe: locale -a | grep -qi '^en_US.utf8$'
//!         apply: locale-gen en_US.UTF-8
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod planner;
pub mod remote;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, ProvisionConfig};
pub use engine::{GuardedAction, IdempotencyGuard, Outcome, Step, StepMode, StepResult};
pub use error::{HostprepError, Result};
pub use planner::{FailurePolicy, Plan, PlanExecutor, PlanResult, RunState};
pub use remote::{Command, ExecutionResult, RemoteExecutor, Target};
pub use report::Reporter;
