//! Plan executor.
//!
//! This module owns the lifecycle of a run: session acquisition (with
//! retries), the exclusive target lock, sequential step execution under the
//! failure policy, cancellation between steps, and releasing the session
//! exactly once on every exit path.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::engine::Step;
use crate::error::{PlanError, Result, TransportError};
use crate::lock::TargetLock;
use crate::remote::{Connector, RemoteExecutor, Target, Transport};
use crate::report::{NullReporter, Reporter};

use super::cancel::CancellationToken;
use super::plan::{FailurePolicy, Plan};
use super::result::{PlanResult, RunState};

/// Name used for runs that are not built from a [`Plan`].
const ADHOC_PLAN_NAME: &str = "adhoc";

static NULL_REPORTER: NullReporter = NullReporter;

/// Executor for provisioning plans.
pub struct PlanExecutor<'a> {
    /// Opens sessions to the target.
    connector: &'a dyn Connector,
    /// Receives progress.
    reporter: &'a dyn Reporter,
    /// Checked before each step.
    cancellation: CancellationToken,
    /// Overrides the error's suggested reconnect delay.
    retry_delay: Option<Duration>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(connector: &'a dyn Connector) -> Self {
        Self {
            connector,
            reporter: &NULL_REPORTER,
            cancellation: CancellationToken::new(),
            retry_delay: None,
        }
    }

    /// Sets the progress reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Uses a fixed delay between connection attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Executes a plan against a target.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is empty, the session cannot be
    /// established, or the target is locked by another run. Failing steps
    /// are not errors; they are recorded in the result.
    pub async fn execute_plan(&self, target: &Target, plan: &Plan) -> Result<PlanResult> {
        self.run(&plan.name, plan.fingerprint.as_deref(), target, &plan.steps, plan.policy)
            .await
    }

    /// Executes steps in order against a target.
    ///
    /// # Errors
    ///
    /// Same as [`PlanExecutor::execute_plan`].
    pub async fn execute(&self, target: &Target, steps: &[Step], policy: FailurePolicy) -> Result<PlanResult> {
        self.run(ADHOC_PLAN_NAME, None, target, steps, policy).await
    }

    async fn run(
        &self,
        name: &str,
        fingerprint: Option<&str>,
        target: &Target,
        steps: &[Step],
        policy: FailurePolicy,
    ) -> Result<PlanResult> {
        if steps.is_empty() {
            return Err(PlanError::EmptyPlan.into());
        }

        let transport = self.connect(target).await?;
        let result = self
            .run_steps(transport.as_ref(), name, fingerprint, target, steps, policy)
            .await;

        let destination = transport.destination().to_string();
        if let Err(e) = transport.close().await {
            warn!("Failed to close session to {destination}: {e}");
        }

        result
    }

    /// Opens a session, retrying retryable failures.
    async fn connect(&self, target: &Target) -> std::result::Result<Box<dyn Transport>, TransportError> {
        let attempts = target.connect_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.connector.connect(target).await {
                Ok(transport) => {
                    debug!("Session to {} acquired on attempt {attempt}", target.destination());
                    return Ok(transport);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self
                        .retry_delay
                        .or_else(|| e.retry_delay_secs().map(Duration::from_secs))
                        .unwrap_or_default();
                    warn!("Attempt {attempt}/{attempts} failed: {e}; retrying in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Giving up on {} after {attempt} attempts: {e}", target.destination());
                    return Err(e);
                }
            }
        }
    }

    async fn run_steps(
        &self,
        transport: &dyn Transport,
        name: &str,
        fingerprint: Option<&str>,
        target: &Target,
        steps: &[Step],
        policy: FailurePolicy,
    ) -> Result<PlanResult> {
        let executor = RemoteExecutor::new(transport, target);

        let mut lock = if target.lock.enabled {
            Some(TargetLock::acquire(&executor, &target.lock, fingerprint).await?)
        } else {
            debug!("Target lock disabled for {}", target.destination());
            None
        };

        let total = steps.len();
        let mut result = PlanResult::new(name, executor.destination(), fingerprint.map(str::to_string), policy, total);
        result.transition(RunState::Running);
        self.reporter.plan_started(name, executor.destination(), total);
        info!("Executing plan '{name}' with {total} steps ({policy})");

        for (index, step) in steps.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                warn!("Run cancelled before step '{}'", step.name);
                result.transition(RunState::Cancelled);
                break;
            }

            if let Some(lock) = lock.as_mut()
                && let Err(e) = lock.refresh_if_needed(&executor).await
            {
                warn!("Failed to refresh target lock: {e}");
            }

            self.reporter.step_started(index, total, step);
            let step_result = step.run(&executor).await;
            self.reporter.step_finished(index, total, &step_result);

            let failed = step_result.is_failed();
            result.record(step_result);

            if failed && policy == FailurePolicy::StopOnFailure {
                error!("Step '{}' failed, stopping", step.name);
                result.transition(RunState::Aborted);
                break;
            }
        }

        if result.state == RunState::Running {
            result.transition(RunState::Completed);
        }

        if let Some(lock) = lock
            && let Err(e) = lock.release(&executor).await
        {
            warn!("Failed to release target lock: {e}");
        }

        self.reporter.plan_finished(&result);
        Ok(result)
    }
}

impl std::fmt::Debug for PlanExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("cancellation", &self.cancellation)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostprepError;
    use crate::engine::{FailureKind, GuardedAction, Outcome, StepResult};
    use crate::error::LockError;
    use crate::lock::{LockInfo, LockSettings};
    use crate::remote::{LocalConnector, MockConnector};
    use crate::testing::{FakeHost, Reply};
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn step(name: &str, apply: &str) -> Step {
        Step::new(name).action(GuardedAction::new(name, format!("probe:{name}"), apply))
    }

    fn abc() -> Vec<Step> {
        vec![step("a", "apply:a"), step("b", "fail:b"), step("c", "apply:c")]
    }

    fn target() -> Target {
        Target::local().without_lock()
    }

    #[derive(Default)]
    struct Recorder {
        finished: Mutex<Vec<String>>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl Reporter for Recorder {
        fn step_finished(&self, _index: usize, _total: usize, result: &StepResult) {
            self.finished.lock().expect("recorder lock").push(result.name.clone());
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
        }
    }

    #[tokio::test]
    async fn test_stop_on_failure_skips_remaining_steps() {
        let host = FakeHost::new();
        let connector = host.connector();

        let result = PlanExecutor::new(&connector)
            .execute(&target(), &abc(), FailurePolicy::StopOnFailure)
            .await
            .expect("session available");

        assert_eq!(result.outcomes(), vec![Outcome::Applied, Outcome::Failed]);
        assert_eq!(result.state, RunState::Aborted);
        assert!(!result.success());
        assert_eq!(host.count("probe:c"), 0);
        assert_eq!(host.closes(), 1);
    }

    #[tokio::test]
    async fn test_continue_on_failure_runs_everything() {
        let host = FakeHost::new();
        let connector = host.connector();
        let recorder = Recorder::default();

        let result = PlanExecutor::new(&connector)
            .with_reporter(&recorder)
            .execute(&target(), &abc(), FailurePolicy::ContinueOnFailure)
            .await
            .expect("session available");

        assert_eq!(result.outcomes(), vec![Outcome::Applied, Outcome::Failed, Outcome::Applied]);
        assert_eq!(result.state, RunState::Completed);
        assert!(!result.success());
        assert_eq!(*recorder.finished.lock().expect("recorder lock"), vec!["a", "b", "c"]);
        assert_eq!(host.closes(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_already_satisfied() {
        let host = FakeHost::new();
        let connector = host.connector();
        let steps = vec![step("a", "apply:a"), step("c", "apply:c")];
        let executor = PlanExecutor::new(&connector);

        let first = executor.execute(&target(), &steps, FailurePolicy::StopOnFailure).await.expect("run");
        let second = executor.execute(&target(), &steps, FailurePolicy::StopOnFailure).await.expect("run");

        assert!(first.success());
        assert_eq!(second.outcomes(), vec![Outcome::AlreadySatisfied; 2]);
        assert_eq!(host.count("apply:"), 2);
        assert_eq!(host.closes(), 2);
    }

    #[tokio::test]
    async fn test_lost_session_is_a_connection_failure() {
        let host = FakeHost::new();
        let connector = host.connector();
        let steps = vec![step("a", "apply:a"), Step::new("b").action(GuardedAction::new("b", "drop:b", "apply:b"))];

        let result = PlanExecutor::new(&connector)
            .execute(&target(), &steps, FailurePolicy::StopOnFailure)
            .await
            .expect("session available");

        assert_eq!(result.steps[1].failure, Some(FailureKind::Connection));
        assert_ne!(result.steps[1].outcome, Outcome::AlreadySatisfied);
        assert_eq!(host.closes(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_an_error() {
        let host = FakeHost::new();
        host.refuse_connections();
        let connector = host.connector();

        let err = PlanExecutor::new(&connector)
            .with_retry_delay(Duration::ZERO)
            .execute(&target(), &abc(), FailurePolicy::StopOnFailure)
            .await
            .expect_err("no session");

        assert!(matches!(err, HostprepError::Transport(TransportError::ConnectFailed { .. })));
        assert_eq!(host.connects(), 3);
        assert_eq!(host.closes(), 0);
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_connect_retries_then_succeeds() {
        let host = FakeHost::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut connector = MockConnector::new();
        {
            let host = host.clone();
            let calls = Arc::clone(&calls);
            connector.expect_connect().times(2).returning(move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TransportError::connect("db:22", "connection refused"))
                } else {
                    Ok(host.transport())
                }
            });
        }

        let result = PlanExecutor::new(&connector)
            .with_retry_delay(Duration::ZERO)
            .execute(&target(), &[step("a", "apply:a")], FailurePolicy::StopOnFailure)
            .await
            .expect("second attempt connects");

        assert!(result.success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(host.closes(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_retried() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            Err(TransportError::Spawn {
                message: String::from("ssh not installed"),
            })
        });

        let err = PlanExecutor::new(&connector)
            .execute(&target(), &abc(), FailurePolicy::StopOnFailure)
            .await
            .expect_err("spawn failures are final");

        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancellation_between_steps() {
        let host = FakeHost::new();
        let connector = host.connector();
        let token = CancellationToken::new();
        let recorder = Recorder {
            cancel_after_first: Some(token.clone()),
            ..Recorder::default()
        };

        let result = PlanExecutor::new(&connector)
            .with_reporter(&recorder)
            .with_cancellation(token)
            .execute(&target(), &abc(), FailurePolicy::ContinueOnFailure)
            .await
            .expect("session available");

        assert_eq!(result.state, RunState::Cancelled);
        assert_eq!(result.outcomes(), vec![Outcome::Applied]);
        assert_eq!(result.not_run(), 2);
        assert!(!result.success());
        assert_eq!(host.closes(), 1);
    }

    #[tokio::test]
    async fn test_empty_plan_never_connects() {
        let host = FakeHost::new();
        let connector = host.connector();

        let err = PlanExecutor::new(&connector)
            .execute(&target(), &[], FailurePolicy::StopOnFailure)
            .await
            .expect_err("nothing to run");

        assert!(matches!(err, HostprepError::Plan(PlanError::EmptyPlan)));
        assert_eq!(host.connects(), 0);
    }

    #[tokio::test]
    async fn test_local_lock_is_released_and_then_refused_while_held() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let settings = LockSettings {
            enabled: true,
            path: dir.path().join("run.lock").display().to_string(),
            expiry_secs: 600,
        };
        let target = Target::local().with_lock(settings.clone());
        let steps = vec![Step::new("noop").action(GuardedAction::new("noop", "true", "true"))];
        let connector = LocalConnector::new();

        let result = PlanExecutor::new(&connector)
            .execute(&target, &steps, FailurePolicy::StopOnFailure)
            .await
            .expect("lock is free");
        assert!(result.success());
        assert!(!dir.path().join("run.lock").exists());

        let transport = connector.connect(&target).await.expect("local connect");
        let held = TargetLock::acquire(&RemoteExecutor::new(transport.as_ref(), &target), &settings, None)
            .await
            .expect("first holder");

        let err = PlanExecutor::new(&connector)
            .execute(&target, &steps, FailurePolicy::StopOnFailure)
            .await
            .expect_err("target is locked");
        assert!(matches!(err, HostprepError::Lock(LockError::LockedByOther { .. })));

        held.release(&RemoteExecutor::new(transport.as_ref(), &target)).await.expect("release");
    }

    #[tokio::test]
    async fn test_lock_refusal_closes_the_session_once() {
        let host = FakeHost::new();
        let held = LockInfo::new("ci-runner@build-7", 600, None);
        host.reply("mkdir -- ", Reply::Exit(3));
        host.reply(
            "cat -- ",
            Reply::Output(0, serde_json::to_string(&held).expect("lock json")),
        );
        let target = Target::local().with_lock(LockSettings {
            enabled: true,
            path: String::from("/tmp/hostprep-test.lock"),
            expiry_secs: 600,
        });
        let steps = vec![Step::new("git").action(GuardedAction::new("git", "probe:git", "apply:git"))];

        let connector = host.connector();

        let err = PlanExecutor::new(&connector)
            .execute(&target, &steps, FailurePolicy::StopOnFailure)
            .await
            .expect_err("target is locked");

        assert!(matches!(err, HostprepError::Lock(LockError::LockedByOther { ref holder, .. }) if holder == "ci-runner@build-7"));
        assert_eq!(host.connects(), 1);
        assert_eq!(host.closes(), 1);
        assert_eq!(host.count("probe:"), 0);
        assert_eq!(host.count("apply:"), 0);
    }
}
