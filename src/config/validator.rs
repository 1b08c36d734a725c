//! Configuration validation for provisioning plans.
//!
//! This module validates configurations before anything touches the target,
//! so a typo fails fast instead of half-way through a run.

use crate::error::{ConfigError, HostprepError, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

use crate::engine::{PACKAGE_PLACEHOLDER, PACKAGES_PLACEHOLDER};
use crate::remote::{CommandContext, TransportKind};

use super::parser::expand_home;
use super::spec::{ActionConfig, ActionKind, ProvisionConfig, StepConfig, TargetConfig};

/// Lock lifetimes above this are probably a unit mistake.
const LONG_LOCK_EXPIRY_SECS: u64 = 7 * 24 * 3600;

/// Upload sources are held in memory and compared on every run.
const LARGE_SOURCE_BYTES: u64 = 8 * 1024 * 1024;

/// Validator for provisioning configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Directory that relative `file` sources are resolved against.
    base_path: Option<PathBuf>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Checks `file` sources relative to `path`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &ProvisionConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(HostprepError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &ProvisionConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !is_valid_name(&config.name) {
            result.error(
                "name",
                format!(
                    "Plan name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.name
                ),
            );
        }

        Self::validate_target(&config.target, &mut result);
        self.validate_steps(&config.steps, &mut result);

        result
    }

    /// Validates the target section.
    fn validate_target(target: &TargetConfig, result: &mut ValidationResult) {
        if target.transport == TransportKind::Ssh && target.host.trim().is_empty() {
            result.error("target.host", "Host is required for the ssh transport");
        }

        if target.port == 0 {
            result.error("target.port", "Port must be between 1 and 65535");
        }

        if target.connect_attempts == 0 {
            result.error("target.connect_attempts", "At least one connection attempt is required");
        }

        if target.connect_timeout_secs == 0 {
            result.error("target.connect_timeout_secs", "Connection timeout must be positive");
        }

        if let Some(user) = &target.user
            && !is_valid_user(user)
        {
            result.error("target.user", format!("Invalid user name: {user}"));
        }

        if let Some(identity) = &target.identity_file
            && !expand_home(identity).exists()
        {
            result
                .warnings
                .push(format!("target.identity_file: {identity} does not exist locally"));
        }

        Self::validate_context(
            &CommandContext {
                as_user: target.as_user.clone(),
                env: target.env.clone(),
                workdir: None,
            },
            "target",
            result,
        );

        let lock = &target.lock;
        if lock.enabled {
            let path = lock.path.trim().trim_end_matches('/');
            if path.is_empty() || path == "~" {
                result.error("target.lock.path", "Lock path must name a dedicated directory");
            } else if !path.starts_with('/') && !path.starts_with("~/") {
                result.error("target.lock.path", format!("Lock path must be absolute: {}", lock.path));
            }

            if lock.expiry_secs == 0 {
                result.error("target.lock.expiry_secs", "Lock expiry must be positive");
            } else if lock.expiry_secs > LONG_LOCK_EXPIRY_SECS {
                result.warnings.push(format!(
                    "target.lock.expiry_secs: {}s is more than a week; a crashed run blocks the target that long",
                    lock.expiry_secs
                ));
            }
        } else {
            result
                .warnings
                .push(String::from("target.lock.enabled: concurrent runs on this target are not prevented"));
        }
    }

    /// Validates all step configurations.
    fn validate_steps(&self, steps: &[StepConfig], result: &mut ValidationResult) {
        if steps.is_empty() {
            result.warnings.push(String::from("No steps defined in configuration"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, step) in steps.iter().enumerate() {
            let prefix = format!("steps[{i}]");

            if !seen_names.insert(step.name.as_str()) {
                result.error(format!("{prefix}.name"), format!("Duplicate step name: {}", step.name));
            }

            if !is_valid_name(&step.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Step name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        step.name
                    ),
                );
            }

            if step.actions.is_empty() {
                result.warnings.push(format!("{prefix}: step '{}' has no actions", step.name));
            }

            Self::validate_context(&step.context, &prefix, result);

            for (j, action) in step.actions.iter().enumerate() {
                self.validate_action(action, &format!("{prefix}.actions[{j}]"), result);
            }
        }
    }

    /// Validates one action.
    fn validate_action(&self, action: &ActionConfig, prefix: &str, result: &mut ValidationResult) {
        Self::validate_context(&action.context, prefix, result);

        match &action.kind {
            ActionKind::Command { probe, apply } => {
                if apply.is_empty() {
                    result.error(format!("{prefix}.apply"), "At least one apply command is required");
                }
                if probe.as_deref().is_some_and(|p| p.trim().is_empty()) {
                    result.error(format!("{prefix}.probe"), "Probe cannot be empty; omit it to always apply");
                }
            }
            ActionKind::LineInFile { path, line } => {
                if path.trim().is_empty() {
                    result.error(format!("{prefix}.path"), "Path cannot be empty");
                }
                if line.contains('\n') {
                    result.error(format!("{prefix}.line"), "Line cannot contain a newline");
                }
            }
            ActionKind::File {
                source, dest, mode, ..
            } => {
                if dest.trim().is_empty() {
                    result.error(format!("{prefix}.dest"), "Destination cannot be empty");
                }
                if let Some(mode) = mode
                    && !is_valid_mode(mode)
                {
                    result.error(format!("{prefix}.mode"), format!("Invalid file mode: {mode}"));
                }
                if let Some(base) = &self.base_path {
                    let path = expand_home(source);
                    let path = if path.is_absolute() { path } else { base.join(path) };
                    match std::fs::metadata(&path) {
                        Ok(meta) if meta.is_file() => {
                            if meta.len() > LARGE_SOURCE_BYTES {
                                result.warnings.push(format!(
                                    "{prefix}.source: {} is {} bytes, uploads this large are slow",
                                    path.display(),
                                    meta.len()
                                ));
                            }
                        }
                        _ => result.error(
                            format!("{prefix}.source"),
                            format!("Source file not found: {}", path.display()),
                        ),
                    }
                }
            }
            ActionKind::Packages {
                packages,
                check,
                install,
            } => {
                if packages.is_empty() {
                    result.warnings.push(format!("{prefix}.packages: empty package list"));
                }
                for (k, name) in packages.iter().enumerate() {
                    if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                        result.error(format!("{prefix}.packages[{k}]"), format!("Invalid package name: '{name}'"));
                    }
                }
                if !check.contains(PACKAGE_PLACEHOLDER) {
                    result.error(
                        format!("{prefix}.check"),
                        format!("Check template must contain {PACKAGE_PLACEHOLDER}"),
                    );
                }
                if !install.contains(PACKAGES_PLACEHOLDER) {
                    result.error(
                        format!("{prefix}.install"),
                        format!("Install template must contain {PACKAGES_PLACEHOLDER}"),
                    );
                }
            }
        }
    }

    /// Validates an acting-as-user and environment overlay.
    fn validate_context(context: &CommandContext, prefix: &str, result: &mut ValidationResult) {
        if let Some(user) = &context.as_user
            && !is_valid_user(user)
        {
            result.error(format!("{prefix}.as_user"), format!("Invalid user name: {user}"));
        }

        validate_env(&context.env, prefix, result);

        if context.workdir.as_deref().is_some_and(|w| w.trim().is_empty()) {
            result.error(format!("{prefix}.workdir"), "Working directory cannot be empty");
        }
    }
}

fn validate_env(env: &BTreeMap<String, String>, prefix: &str, result: &mut ValidationResult) {
    for key in env.keys() {
        if !is_valid_env_name(key) {
            result.error(format!("{prefix}.env.{key}"), format!("Invalid environment variable name: {key}"));
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    // Rest must be lowercase alphanumeric or hyphen
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// POSIX-portable account names, as `useradd` accepts them.
fn is_valid_user(name: &str) -> bool {
    let body = name.strip_suffix('$').unwrap_or(name);
    let mut chars = body.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }

    name.len() <= 32 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Octal `chmod` modes such as `644` or `0600`.
fn is_valid_mode(mode: &str) -> bool {
    (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c))
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> ProvisionConfig {
        ConfigParser::new().parse_yaml(yaml, None).expect("valid yaml")
    }

    fn fields(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("base-packages"));
        assert!(is_valid_name("ruby-3"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Base")); // uppercase
        assert!(!is_valid_name("1-step")); // starts with number
        assert!(!is_valid_name("base_packages")); // underscore
        assert!(!is_valid_name("step-")); // ends with hyphen
        assert!(!is_valid_name("a--b")); // consecutive hyphens
    }

    #[test]
    fn test_user_env_and_mode_checks() {
        assert!(is_valid_user("deploy"));
        assert!(is_valid_user("_apt"));
        assert!(!is_valid_user("Deploy"));
        assert!(!is_valid_user("bad user"));

        assert!(is_valid_env_name("RBENV_ROOT"));
        assert!(!is_valid_env_name("1PATH"));
        assert!(!is_valid_env_name("MY-VAR"));

        assert!(is_valid_mode("644"));
        assert!(is_valid_mode("0600"));
        assert!(!is_valid_mode("rw-r--r--"));
        assert!(!is_valid_mode("888"));
    }

    #[test]
    fn test_collects_step_and_action_errors() {
        let config = parse(
            r"
name: box
target:
  host: db
steps:
  - name: tools
    actions:
      - kind: packages
        packages: [git]
        check: dpkg -s git
        install: apt-get install -y {packages}
  - name: tools
    as_user: Root
    actions:
      - kind: command
        apply: []
",
        );

        let result = ConfigValidator::new().check(&config);
        assert_eq!(
            fields(&result),
            vec![
                "steps[0].actions[0].check",
                "steps[1].name",
                "steps[1].as_user",
                "steps[1].actions[0].apply",
            ]
        );
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_missing_source_and_host() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let config = parse(
            r"
name: box
target:
  lock:
    path: /
steps:
  - name: dotfiles
    actions:
      - kind: file
        source: files/vimrc
        dest: ~/.vimrc
",
        );

        let result = ConfigValidator::new().with_base_path(dir.path()).check(&config);
        assert_eq!(
            fields(&result),
            vec!["target.host", "target.lock.path", "steps[0].actions[0].source"]
        );

        std::fs::create_dir(dir.path().join("files")).expect("mkdir");
        std::fs::write(dir.path().join("files/vimrc"), "set number\n").expect("write");
        let result = ConfigValidator::new().with_base_path(dir.path()).check(&config);
        assert!(!fields(&result).contains(&"steps[0].actions[0].source"));
        assert!(result.warnings.iter().all(|w| !w.contains("source")));
    }

    #[test]
    fn test_large_source_is_a_warning() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        std::fs::File::create(dir.path().join("image.bin"))
            .and_then(|f| f.set_len(LARGE_SOURCE_BYTES + 1))
            .expect("sparse file");
        let config = parse(
            r"
name: box
target:
  transport: local
steps:
  - name: assets
    actions:
      - kind: file
        source: image.bin
        dest: /srv/image.bin
",
        );

        let result = ConfigValidator::new().with_base_path(dir.path()).check(&config);
        assert!(result.is_valid());
        assert!(
            result.warnings.iter().any(|w| w.starts_with("steps[0].actions[0].source")),
            "{:?}",
            result.warnings
        );
    }

    #[test]
    fn test_local_target_needs_no_host() {
        let config = parse(
            r"
name: laptop
target:
  transport: local
steps: []
",
        );

        let result = ConfigValidator::new().validate(&config).expect("valid config");
        assert!(result.warnings.iter().any(|w| w.contains("No steps")));
    }
}
