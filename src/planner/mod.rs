//! Planning module.
//!
//! This module compiles configurations into ordered plans and runs them:
//! the executor, the run state machine, results and cancellation.

mod cancel;
mod executor;
mod plan;
mod result;

pub use cancel::CancellationToken;
pub use executor::PlanExecutor;
pub use plan::{FailurePolicy, Plan};
pub use result::{PlanResult, RunState};
