//! In-memory target used by unit tests.
//!
//! Scripts follow a tiny convention so tests can describe host behavior
//! without a shell:
//!
//! | script        | behavior                                        |
//! |---------------|-------------------------------------------------|
//! | `probe:X`     | exit 0 if every word of `X` is present, else 1  |
//! | `apply:X`     | marks every word of `X` present, exit 0         |
//! | `fail:X`      | exit 1 with `X` on stderr                       |
//! | `missing:X`   | exit 127 (command not found)                    |
//! | `drop:X`      | the session is lost                             |
//! | anything else | exit 0                                          |
//!
//! Explicit replies registered with [`FakeHost::reply`] take precedence.

#![allow(clippy::expect_used)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::TransportError;
use crate::remote::{Command, Connector, ExecutionResult, Target, Transport};

/// Canned reply for scripts containing a needle.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit with the given status.
    Exit(i32),
    /// Exit with the given status and standard output.
    Output(i32, String),
    /// The command could not be started.
    Spawn,
    /// Lose the session.
    Drop,
}

#[derive(Default)]
struct Inner {
    present: Mutex<HashSet<String>>,
    replies: Mutex<Vec<(String, Reply)>>,
    commands: Mutex<Vec<Command>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    refuse: AtomicBool,
}

/// Shared handle to the fake host state.
#[derive(Clone, Default)]
pub struct FakeHost {
    inner: Arc<Inner>,
}

/// Connector handing out sessions to a [`FakeHost`].
#[derive(Clone)]
pub struct FakeConnector {
    host: FakeHost,
}

struct FakeTransport {
    host: FakeHost,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_present(items: &[&str]) -> Self {
        let host = Self::new();
        for item in items {
            host.mark(item);
        }
        host
    }

    pub fn mark(&self, item: &str) {
        self.inner
            .present
            .lock()
            .expect("present lock")
            .insert(item.to_string());
    }

    pub fn is_present(&self, item: &str) -> bool {
        self.inner.present.lock().expect("present lock").contains(item)
    }

    pub fn reply(&self, needle: &str, reply: Reply) {
        self.inner
            .replies
            .lock()
            .expect("replies lock")
            .push((needle.to_string(), reply));
    }

    pub fn refuse_connections(&self) {
        self.inner.refuse.store(true, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.inner.commands.lock().expect("commands lock").clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.script).collect()
    }

    /// Number of executed scripts starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.scripts().iter().filter(|s| s.starts_with(prefix)).count()
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(FakeTransport { host: self.clone() })
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector { host: self.clone() }
    }

    fn run(&self, command: &Command) -> Result<ExecutionResult, TransportError> {
        self.inner
            .commands
            .lock()
            .expect("commands lock")
            .push(command.clone());

        let script = command.script.as_str();
        let canned = self
            .inner
            .replies
            .lock()
            .expect("replies lock")
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());

        match canned {
            Some(Reply::Exit(code)) => return Ok(ExecutionResult::from_exit(code, "", "")),
            Some(Reply::Output(code, stdout)) => return Ok(ExecutionResult::from_exit(code, stdout, "")),
            Some(Reply::Spawn) => {
                return Err(TransportError::Spawn {
                    message: String::from("Argument list too long (os error 7)"),
                });
            }
            Some(Reply::Drop) => return Err(TransportError::disconnected("fake", "connection reset")),
            None => {}
        }

        let (verb, arg) = script.split_once(':').unwrap_or((script, ""));
        let words = arg.split_whitespace();

        let result = match verb {
            "probe" => {
                let present = self.inner.present.lock().expect("present lock");
                let all = words.into_iter().all(|w| present.contains(w));
                ExecutionResult::from_exit(i32::from(!all), "", "")
            }
            "apply" => {
                let mut present = self.inner.present.lock().expect("present lock");
                for word in words {
                    present.insert(word.to_string());
                }
                ExecutionResult::from_exit(0, "", "")
            }
            "fail" => ExecutionResult::from_exit(1, "", arg),
            "missing" => ExecutionResult::from_exit(127, "", "sh: command not found"),
            "drop" => return Err(TransportError::disconnected("fake", "connection reset")),
            _ => ExecutionResult::from_exit(0, "", ""),
        };

        Ok(result)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _target: &Target) -> Result<Box<dyn Transport>, TransportError> {
        self.host.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.host.inner.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::connect("fake", "connection refused"));
        }
        Ok(self.host.transport())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, command: &Command) -> Result<ExecutionResult, TransportError> {
        self.host.run(command)
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.host.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destination(&self) -> &str {
        "fake"
    }
}
