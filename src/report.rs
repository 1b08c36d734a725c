//! Progress reporting.
//!
//! A run hands every [`StepResult`] to a [`Reporter`] as soon as the step
//! finishes. The console implementation lives with the CLI; this module
//! provides the boundary plus a silent and a log-backed reporter.

use tracing::{info, warn};

use crate::engine::{Outcome, Step, StepResult};
use crate::planner::PlanResult;

/// Receives progress of a plan run.
///
/// Every method has a no-op default so implementations pick what they need.
pub trait Reporter: Send + Sync {
    /// A run is about to execute `total` steps against `target`.
    fn plan_started(&self, _plan: &str, _target: &str, _total: usize) {}

    /// Step `index` (zero-based) is about to run.
    fn step_started(&self, _index: usize, _total: usize, _step: &Step) {}

    /// Step `index` (zero-based) finished.
    fn step_finished(&self, _index: usize, _total: usize, _result: &StepResult) {}

    /// The run reached a terminal state.
    fn plan_finished(&self, _result: &PlanResult) {}
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Reporter that writes progress to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn plan_started(&self, plan: &str, target: &str, total: usize) {
        info!("Running plan '{plan}' on {target} ({total} steps)");
    }

    fn step_finished(&self, index: usize, total: usize, result: &StepResult) {
        match result.outcome {
            Outcome::Failed => warn!(
                "[{}/{total}] {}: failed ({})",
                index + 1,
                result.name,
                result.detail
            ),
            outcome => info!("[{}/{total}] {}: {outcome}", index + 1, result.name),
        }
    }

    fn plan_finished(&self, result: &PlanResult) {
        info!(
            "Plan '{}' {}: {} applied, {} already satisfied, {} failed",
            result.plan,
            result.state,
            result.count(Outcome::Applied),
            result.count(Outcome::AlreadySatisfied),
            result.count(Outcome::Failed)
        );
    }
}
