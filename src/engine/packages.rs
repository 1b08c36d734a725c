//! Batched package checks and installs.
//!
//! Each package is probed on its own; one install command then covers only
//! the packages that were missing.

use tracing::{debug, info};

use crate::remote::shell::quote;
use crate::remote::{Command, CommandContext};

use super::guard::{ActionFailure, IdempotencyGuard, ProbeVerdict};
use super::result::{ActionResult, FailureKind};

/// Placeholder for a single package name in the check template.
pub const PACKAGE_PLACEHOLDER: &str = "{package}";

/// Placeholder for the space-separated missing packages in the install template.
pub const PACKAGES_PLACEHOLDER: &str = "{packages}";

/// A set of packages managed with one check and one install template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSet {
    /// What the set is, for reports.
    pub description: String,
    /// Package names, in declaration order.
    pub packages: Vec<String>,
    /// Check command template containing `{package}`.
    pub check: String,
    /// Install command template containing `{packages}`.
    pub install: String,
    /// Context of the set's commands, overriding the step's.
    pub context: CommandContext,
}

/// Packages split by what the probes reported.
///
/// The two lists are independent; a name is in exactly one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageStatus {
    /// Packages already present on the target.
    pub installed: Vec<String>,
    /// Packages that still need installing.
    pub missing: Vec<String>,
}

impl PackageSet {
    /// Creates a package set.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        packages: Vec<String>,
        check: impl Into<String>,
        install: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            packages,
            check: check.into(),
            install: install.into(),
            context: CommandContext::default(),
        }
    }

    /// Sets the context of the set's commands.
    #[must_use]
    pub fn with_context(mut self, context: CommandContext) -> Self {
        self.context = context;
        self
    }

    /// Renders the check command for one package.
    #[must_use]
    pub fn check_command(&self, package: &str) -> Command {
        Command::new(self.check.replace(PACKAGE_PLACEHOLDER, &quote(package)))
    }

    /// Renders the install command for the given packages.
    #[must_use]
    pub fn install_command(&self, packages: &[String]) -> Command {
        let names = packages.iter().map(|p| quote(p)).collect::<Vec<_>>().join(" ");
        Command::new(self.install.replace(PACKAGES_PLACEHOLDER, &names))
    }

    /// Probes every package and returns the partition.
    pub(crate) async fn status(
        &self,
        guard: &IdempotencyGuard<'_>,
        context: &CommandContext,
    ) -> Result<PackageStatus, ActionFailure> {
        let context = context.layered(&self.context);
        let mut status = PackageStatus::default();

        for package in &self.packages {
            let probe = self.check_command(package).with_context(&context);
            match guard.check(&probe).await? {
                ProbeVerdict::Satisfied => status.installed.push(package.clone()),
                ProbeVerdict::NotSatisfied => status.missing.push(package.clone()),
                ProbeVerdict::Errored(result) => {
                    return Err(ActionFailure {
                        kind: FailureKind::Probe,
                        detail: format!("checking {package}: {}", result.summary()),
                        exit_code: result.exit_code,
                    });
                }
            }
        }

        Ok(status)
    }

    /// Installs whatever is missing.
    pub async fn run(&self, guard: &IdempotencyGuard<'_>, context: &CommandContext) -> ActionResult {
        let status = match self.status(guard, context).await {
            Ok(status) => status,
            Err(failure) => return failure.into_result(&self.description),
        };

        debug!(
            "{}: {} installed, {} missing",
            self.description,
            status.installed.len(),
            status.missing.len()
        );

        if status.missing.is_empty() {
            return ActionResult::satisfied(&self.description);
        }

        info!("{}: installing {}", self.description, status.missing.join(", "));
        let install = self.install_command(&status.missing);
        match guard
            .apply_all(std::slice::from_ref(&install), &context.layered(&self.context))
            .await
        {
            Ok(()) => ActionResult::applied(
                &self.description,
                format!("installed {}", status.missing.join(", ")),
            ),
            Err(failure) => failure.into_result(&self.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Outcome;
    use crate::remote::{RemoteExecutor, Target};
    use crate::testing::FakeHost;

    fn gems(names: &[&str]) -> PackageSet {
        PackageSet::new(
            "gems",
            names.iter().map(ToString::to_string).collect(),
            "probe:{package}",
            "apply:{packages}",
        )
    }

    async fn status_and_run(host: &FakeHost, set: &PackageSet) -> (PackageStatus, ActionResult) {
        let transport = host.transport();
        let target = Target::local().without_lock();
        let guard = IdempotencyGuard::new(RemoteExecutor::new(transport.as_ref(), &target));
        let context = CommandContext::default();

        let status = set.status(&guard, &context).await.expect("probes run");
        let result = set.run(&guard, &context).await;
        (status, result)
    }

    #[tokio::test]
    async fn test_partition_is_independent() {
        let host = FakeHost::with_present(&["bundler"]);
        let (status, result) = status_and_run(&host, &gems(&["bundler", "rails", "pry"])).await;

        assert_eq!(status.installed, vec!["bundler"]);
        assert_eq!(status.missing, vec!["rails", "pry"]);
        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(result.detail, "installed rails, pry");
        assert_eq!(host.scripts().last().map(String::as_str), Some("apply:rails pry"));
    }

    #[tokio::test]
    async fn test_all_installed_is_satisfied() {
        let host = FakeHost::with_present(&["git", "curl"]);
        let (_, result) = status_and_run(&host, &gems(&["git", "curl"])).await;

        assert_eq!(result.outcome, Outcome::AlreadySatisfied);
        assert_eq!(host.count("apply:"), 0);
    }

    #[tokio::test]
    async fn test_broken_check_fails_without_install() {
        let host = FakeHost::new();
        let set = PackageSet::new("gems", vec![String::from("rails")], "missing:{package}", "apply:{packages}");
        let transport = host.transport();
        let target = Target::local().without_lock();
        let guard = IdempotencyGuard::new(RemoteExecutor::new(transport.as_ref(), &target));

        let result = set.run(&guard, &CommandContext::default()).await;

        assert_eq!(result.failure, Some(FailureKind::Probe));
        assert_eq!(host.count("apply:"), 0);
    }

    #[test]
    fn test_templates_quote_names() {
        let set = PackageSet::new("apt", Vec::new(), "dpkg -s {package}", "apt-get install -y {packages}");
        assert_eq!(set.check_command("libssl-dev").script, "dpkg -s libssl-dev");
        assert_eq!(
            set.install_command(&[String::from("a b"), String::from("c")]).script,
            "apt-get install -y 'a b' c"
        );
    }
}
