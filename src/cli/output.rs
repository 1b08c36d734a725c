//! Output formatting for CLI commands.
//!
//! This module renders plans, run results, validation reports and lock
//! information as text or JSON, and provides the console progress reporter
//! used by `apply`.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::engine::{Outcome, Step, StepResult};
use crate::lock::LockInfo;
use crate::planner::{Plan, PlanResult};
use crate::report::Reporter;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan step row for table display.
#[derive(Tabled)]
struct PlanStepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Step")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Actions")]
    actions: usize,
    #[tabled(rename = "Description")]
    description: String,
}

/// Step result row for table display.
#[derive(Tabled)]
struct StepResultRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Step")]
    name: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Detail")]
    detail: String,
    #[tabled(rename = "Time")]
    time: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, target: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson::new(plan, target)).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, target),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan, target: &str) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "\nPlan '{}' for {}", plan.name.bold(), target);
        if let Some(fingerprint) = &plan.fingerprint {
            let _ = writeln!(output, "   Config hash: {}", short(fingerprint));
        }
        let _ = writeln!(output, "   Policy: {}\n", plan.policy);

        if plan.is_empty() {
            let _ = writeln!(output, "{} No steps selected.", "⚠".yellow());
            return output;
        }

        let rows: Vec<PlanStepRow> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| PlanStepRow {
                index: i + 1,
                name: s.name.clone(),
                mode: s.mode.as_str().to_string(),
                actions: s.actions.len(),
                description: Self::truncate(s.description.as_deref().unwrap_or("-"), 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} steps, {} actions\n",
            plan.len().to_string().bold(),
            plan.action_count().to_string().bold()
        );

        output
    }

    /// Formats the result of a run.
    #[must_use]
    pub fn format_result(&self, result: &PlanResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => Self::format_result_text(result),
        }
    }

    fn format_result_text(result: &PlanResult) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\nRun of '{}' on {}: {}\n",
            result.plan,
            result.target,
            Self::format_state(result)
        );

        if !result.steps.is_empty() {
            let rows: Vec<StepResultRow> = result
                .steps
                .iter()
                .enumerate()
                .map(|(i, s)| StepResultRow {
                    index: i + 1,
                    name: s.name.clone(),
                    outcome: Self::format_outcome(s.outcome),
                    detail: Self::truncate(&s.detail, 50),
                    time: format!("{:.1}s", millis_to_secs(s.duration_ms)),
                })
                .collect();

            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nSummary: {} applied, {} already satisfied, {} failed",
            result.count(Outcome::Applied).to_string().green(),
            result.count(Outcome::AlreadySatisfied).to_string().dimmed(),
            result.count(Outcome::Failed).to_string().red()
        );
        if result.not_run() > 0 {
            let _ = write!(output, ", {} not run", result.not_run().to_string().yellow());
        }
        output.push('\n');

        let failed: Vec<&StepResult> = result.failed_steps().collect();
        if !failed.is_empty() {
            let _ = write!(output, "\n{} Failed steps:\n", "✗".red());
            for step in failed {
                let kind = step.failure.map_or_else(String::new, |k| format!(" [{k}]"));
                let _ = writeln!(output, "   - {}{kind}: {}", step.name, step.detail);
            }
        }

        output
    }

    /// Formats a validation report.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ValidationJson::new(result, show_warnings)).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid.", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Configuration has {} error(s):",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the lock held on a target, if any.
    #[must_use]
    pub fn format_lock(&self, target: &str, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "target": target,
                "locked": lock.is_some(),
                "lock": lock,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let Some(lock) = lock else {
                    return format!("{} {target} is not locked.\n", "✓".green());
                };

                let mut output = String::new();
                let _ = writeln!(output, "\nLock on {target}");
                let _ = writeln!(output, "   ID: {}", lock.lock_id);
                let _ = writeln!(output, "   Holder: {}", lock.holder);
                let _ = writeln!(output, "   Acquired: {}", lock.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"));
                if lock.is_expired() {
                    let _ = writeln!(output, "   Expires: {}", "expired".red());
                } else {
                    let _ = writeln!(output, "   Expires: in {}s", lock.remaining_secs());
                }
                if let Some(fingerprint) = &lock.fingerprint {
                    let _ = writeln!(output, "   Config hash: {}", short(fingerprint));
                }
                output
            }
        }
    }

    fn format_state(result: &PlanResult) -> String {
        if result.success() {
            result.state.as_str().green().to_string()
        } else if result.has_failures() {
            format!("{} with failures", result.state).red().to_string()
        } else {
            result.state.as_str().yellow().to_string()
        }
    }

    fn format_outcome(outcome: Outcome) -> String {
        match outcome {
            Outcome::Applied => "applied".green().to_string(),
            Outcome::AlreadySatisfied => "already satisfied".dimmed().to_string(),
            Outcome::Failed => "failed".red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, marker: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{marker} {message}"),
        }
    }
}

/// Reporter that prints one colored line per step to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    /// Renders the progress line of a finished step.
    #[must_use]
    pub fn line(index: usize, total: usize, result: &StepResult) -> String {
        let counter = format!("[{}/{total}]", index + 1).dimmed();
        match result.outcome {
            Outcome::Applied => format!("{counter} {} {} ({})", "✓".green(), result.name, result.detail),
            Outcome::AlreadySatisfied => format!("{counter} {} {} (already satisfied)", "=".dimmed(), result.name),
            Outcome::Failed => format!("{counter} {} {}: {}", "✗".red(), result.name, result.detail.red()),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn plan_started(&self, plan: &str, target: &str, total: usize) {
        eprintln!("Applying '{}' to {target} ({total} steps)", plan.bold());
    }

    fn step_started(&self, index: usize, total: usize, step: &Step) {
        eprintln!("{} {}...", format!("[{}/{total}]", index + 1).dimmed(), step.name);
    }

    fn step_finished(&self, index: usize, total: usize, result: &StepResult) {
        eprintln!("{}", Self::line(index, total, result));
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[allow(clippy::cast_precision_loss)]
fn millis_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    plan: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    policy: String,
    steps: Vec<StepJson>,
}

#[derive(serde::Serialize)]
struct StepJson {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    mode: String,
    actions: Vec<String>,
}

impl PlanJson {
    fn new(plan: &Plan, target: &str) -> Self {
        Self {
            plan: plan.name.clone(),
            target: target.to_string(),
            fingerprint: plan.fingerprint.clone(),
            policy: plan.policy.to_string(),
            steps: plan
                .steps
                .iter()
                .map(|s| StepJson {
                    name: s.name.clone(),
                    description: s.description.clone(),
                    mode: s.mode.as_str().to_string(),
                    actions: s.actions.iter().map(|a| a.description().to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<ErrorJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(serde::Serialize)]
struct ErrorJson {
    field: String,
    message: String,
}

impl ValidationJson {
    fn new(result: &ValidationResult, show_warnings: bool) -> Self {
        Self {
            valid: result.is_valid(),
            errors: result
                .errors
                .iter()
                .map(|e| ErrorJson {
                    field: e.field.clone(),
                    message: e.message.clone(),
                })
                .collect(),
            warnings: if show_warnings {
                result.warnings.clone()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ActionResult, FailureKind, GuardedAction};
    use crate::planner::{FailurePolicy, RunState};

    fn run() -> PlanResult {
        let mut result = PlanResult::new("box", "deploy@10.0.0.5:22", None, FailurePolicy::StopOnFailure, 3);
        result.transition(RunState::Running);
        result.record(StepResult::from_actions("locale", vec![ActionResult::satisfied("en_US")], 5));
        result.record(StepResult::from_actions(
            "ruby",
            vec![ActionResult::failed("install", FailureKind::Apply, "exit 2: no space", Some(2))],
            1500,
        ));
        result.transition(RunState::Aborted);
        result
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_result_json_carries_outcomes() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value = serde_json::from_str(&formatter.format_result(&run())).expect("valid json");

        assert_eq!(json["state"], "aborted");
        assert_eq!(json["steps"][0]["outcome"], "already_satisfied");
        assert_eq!(json["steps"][1]["failure"], "apply");
        assert_eq!(json["declared"], 3);
    }

    #[test]
    fn test_result_text_lists_failures() {
        colored::control::set_override(false);
        let text = OutputFormatter::new(OutputFormat::Text).format_result(&run());

        assert!(text.contains("aborted with failures"));
        assert!(text.contains("1 not run"));
        assert!(text.contains("ruby [apply]: install: exit 2: no space"));
    }

    #[test]
    fn test_plan_json_lists_actions() {
        let plan = Plan::new(
            "box",
            vec![Step::new("locale").action(GuardedAction::new("generate en_US", "locale -a", "locale-gen"))],
        );
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_plan(&plan, "local")).expect("valid json");

        assert_eq!(json["steps"][0]["actions"][0], "generate en_US");
        assert_eq!(json["steps"][0]["mode"], "all_or_nothing");
        assert_eq!(json["policy"], "stop on failure");
    }

    #[test]
    fn test_console_line() {
        colored::control::set_override(false);
        let result = StepResult::from_actions("locale", vec![ActionResult::satisfied("en_US")], 3);
        assert_eq!(ConsoleReporter::line(0, 2, &result), "[1/2] = locale (already satisfied)");
    }

    #[test]
    fn test_lock_text_when_unlocked() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        assert_eq!(formatter.format_lock("local", None), "✓ local is not locked.\n");
    }
}
