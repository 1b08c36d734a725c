//! Provisioning engine module.
//!
//! This module turns probes and applies into outcomes:
//! guarded actions, package batches, and steps.

mod builtin;
mod guard;
mod packages;
mod result;
mod step;

pub use builtin::{line_in_file, upload_file};
pub use guard::{GuardedAction, IdempotencyGuard, ProbeVerdict};
pub use packages::{PACKAGE_PLACEHOLDER, PACKAGES_PLACEHOLDER, PackageSet, PackageStatus};
pub use result::{ActionResult, FailureKind, Outcome, StepResult};
pub use step::{Action, Step, StepMode};
