//! Configuration hashing for change detection.
//!
//! The fingerprint identifies which configuration a run applied. It is shown
//! in plans and results and recorded in the target lock.

use sha2::{Digest, Sha256};

use crate::remote::CommandContext;

use super::spec::{ActionConfig, ActionKind, ProvisionConfig, StepConfig};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire configuration.
    ///
    /// This hash changes when any part of the configuration changes.
    #[must_use]
    pub fn hash_config(&self, config: &ProvisionConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.name.as_bytes());
        hasher.update(format!("{:?}", config.policy).as_bytes());

        // Target identity; connection tuning does not change what is applied
        let target = &config.target;
        hasher.update(target.host.as_bytes());
        hasher.update(target.port.to_be_bytes());
        if let Some(user) = &target.user {
            hasher.update(user.as_bytes());
        }
        if let Some(as_user) = &target.as_user {
            hasher.update(as_user.as_bytes());
        }
        for (key, value) in &target.env {
            hasher.update(key.as_bytes());
            hasher.update(value.as_bytes());
        }

        for step in &config.steps {
            hasher.update(self.hash_step(step).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single step.
    #[must_use]
    pub fn hash_step(&self, step: &StepConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(step.name.as_bytes());
        hasher.update(format!("{:?}", step.mode).as_bytes());
        hash_context(&mut hasher, &step.context);

        for action in &step.actions {
            hash_action(&mut hasher, action);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn hash_context(hasher: &mut Sha256, context: &CommandContext) {
    if let Some(user) = &context.as_user {
        hasher.update(b"user:");
        hasher.update(user.as_bytes());
    }
    // BTreeMap iterates in key order
    for (key, value) in &context.env {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    if let Some(dir) = &context.workdir {
        hasher.update(b"cd:");
        hasher.update(dir.as_bytes());
    }
}

fn hash_action(hasher: &mut Sha256, action: &ActionConfig) {
    hasher.update(action.describe().as_bytes());
    hash_context(hasher, &action.context);

    match &action.kind {
        ActionKind::Command { probe, apply } => {
            hasher.update(b"command");
            if let Some(probe) = probe {
                hasher.update(probe.as_bytes());
            }
            for command in apply.to_vec() {
                hasher.update(command.as_bytes());
            }
        }
        ActionKind::LineInFile { path, line } => {
            hasher.update(b"line_in_file");
            hasher.update(path.as_bytes());
            hasher.update(line.as_bytes());
        }
        ActionKind::File {
            source,
            dest,
            mode,
            overwrite,
        } => {
            hasher.update(b"file");
            hasher.update(source.as_bytes());
            hasher.update(dest.as_bytes());
            if let Some(mode) = mode {
                hasher.update(mode.as_bytes());
            }
            hasher.update([u8::from(*overwrite)]);
        }
        ActionKind::Packages {
            packages,
            check,
            install,
        } => {
            hasher.update(b"packages");
            for package in packages {
                hasher.update(package.as_bytes());
            }
            hasher.update(check.as_bytes());
            hasher.update(install.as_bytes());
        }
    }
}
