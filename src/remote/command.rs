//! Command and execution result value types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Execution context shared by every command of a step or target.
///
/// Fields left unset here are inherited from the next outer layer
/// (action, then step, then target).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Account the command runs as (via `sudo -u`), if not the login user.
    #[serde(default)]
    pub as_user: Option<String>,
    /// Environment overlay exported before the command runs.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory for the command.
    #[serde(default)]
    pub workdir: Option<String>,
}

/// A single shell instruction plus the context it runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Command {
    /// Shell script passed to `sh -c`.
    pub script: String,
    /// Account the command runs as.
    pub as_user: Option<String>,
    /// Environment overlay.
    pub env: BTreeMap<String, String>,
    /// Working directory.
    pub workdir: Option<String>,
    /// Bytes written to the command's standard input, closed afterwards.
    #[serde(skip)]
    pub stdin: Option<Vec<u8>>,
}

/// Structured result of running one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the command exited with status zero.
    pub succeeded: bool,
    /// Wall-clock time the command took.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl CommandContext {
    /// Returns a context where every field set in `inner` wins over `self`.
    #[must_use]
    pub fn layered(&self, inner: &Self) -> Self {
        let mut env = self.env.clone();
        env.extend(inner.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            as_user: inner.as_user.clone().or_else(|| self.as_user.clone()),
            env,
            workdir: inner.workdir.clone().or_else(|| self.workdir.clone()),
        }
    }

    /// Returns true if the context changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_user.is_none() && self.env.is_empty() && self.workdir.is_none()
    }
}

impl Command {
    /// Creates a command running `script` in the login user's context.
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Runs the command as another account.
    #[must_use]
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.as_user = Some(user.into());
        self
    }

    /// Adds one variable to the environment overlay.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Feeds `input` to the command's standard input.
    ///
    /// Payloads of any size travel this way instead of on the command line.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Returns a copy with unset fields filled from `context`.
    ///
    /// Values already on the command take precedence, including
    /// individual environment variables.
    #[must_use]
    pub fn with_context(&self, context: &CommandContext) -> Self {
        let mut env = context.env.clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            script: self.script.clone(),
            as_user: self.as_user.clone().or_else(|| context.as_user.clone()),
            env,
            workdir: self.workdir.clone().or_else(|| context.workdir.clone()),
            stdin: self.stdin.clone(),
        }
    }
}

impl From<&str> for Command {
    fn from(script: &str) -> Self {
        Self::new(script)
    }
}

impl From<String> for Command {
    fn from(script: String) -> Self {
        Self::new(script)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(user) = &self.as_user {
            write!(f, "[{user}] ")?;
        }
        write!(f, "{}", self.script)
    }
}

impl ExecutionResult {
    /// Builds a result from a finished process.
    #[must_use]
    pub fn from_output(output: &std::process::Output, duration: Duration) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            succeeded: output.status.success(),
            duration,
        }
    }

    /// Builds a result from an exit code and captured output.
    #[must_use]
    pub fn from_exit(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            succeeded: exit_code == 0,
            duration: Duration::ZERO,
        }
    }

    /// Combined trimmed output, stdout first.
    #[must_use]
    pub fn output(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }

    /// One-line summary for reports: the last non-empty line of stderr,
    /// falling back to stdout.
    #[must_use]
    pub fn summary(&self) -> String {
        let line = last_line(&self.stderr).or_else(|| last_line(&self.stdout));
        let code = self
            .exit_code
            .map_or_else(|| String::from("signal"), |c| format!("exit {c}"));

        match line {
            Some(line) => format!("{code}: {}", truncate(line, 160)),
            None => code,
        }
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|l| !l.is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_values_win_over_context() {
        let context = CommandContext {
            as_user: Some(String::from("deploy")),
            env: BTreeMap::from([
                (String::from("HOME"), String::from("/home/deploy")),
                (String::from("LANG"), String::from("C")),
            ]),
            workdir: Some(String::from("/srv")),
        };

        let command = Command::new("make install")
            .env("LANG", "en_US.UTF-8")
            .workdir("/opt/app")
            .stdin("payload")
            .with_context(&context);

        assert_eq!(command.as_user.as_deref(), Some("deploy"));
        assert_eq!(command.workdir.as_deref(), Some("/opt/app"));
        assert_eq!(command.env["LANG"], "en_US.UTF-8");
        assert_eq!(command.env["HOME"], "/home/deploy");
        assert_eq!(command.stdin.as_deref(), Some(b"payload".as_slice()));
    }

    #[test]
    fn test_layered_context_prefers_inner() {
        let outer = CommandContext {
            as_user: Some(String::from("root")),
            env: BTreeMap::from([(String::from("A"), String::from("1"))]),
            workdir: None,
        };
        let inner = CommandContext {
            as_user: None,
            env: BTreeMap::from([(String::from("A"), String::from("2"))]),
            workdir: Some(String::from("~")),
        };

        let merged = outer.layered(&inner);
        assert_eq!(merged.as_user.as_deref(), Some("root"));
        assert_eq!(merged.env["A"], "2");
        assert_eq!(merged.workdir.as_deref(), Some("~"));
    }

    #[test]
    fn test_summary_prefers_stderr() {
        let result = ExecutionResult::from_exit(
            100,
            "Reading package lists...",
            "E: Unable to locate package nginxx\n",
        );
        assert!(!result.succeeded);
        assert_eq!(result.summary(), "exit 100: E: Unable to locate package nginxx");

        let quiet = ExecutionResult::from_exit(1, "", "");
        assert_eq!(quiet.summary(), "exit 1");
    }
}
