//! Error types for hostprep.
//!
//! Only conditions that stop a run from starting (or from owning the target)
//! are errors. A remote command that exits non-zero is never an error here;
//! it is carried as data in `ExecutionResult` and `StepResult`.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for hostprep.
#[derive(Debug, Error)]
pub enum HostprepError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport errors (session cannot be established or was lost).
    #[error("Connection error: {0}")]
    Transport(#[from] TransportError),

    /// Target lock errors.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing or malformed.
    #[error("Invalid environment variable {name}: {message}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// A local file referenced by the configuration could not be read.
    #[error("Cannot read source file {path}: {message}")]
    SourceUnreadable {
        /// Path of the local file.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },
}

/// Transport-level errors: the host is unreachable or the session dropped.
///
/// This is the only class of failure that a command can raise instead of
/// returning an `ExecutionResult`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The session could not be established.
    #[error("Failed to connect to {destination}: {message}")]
    ConnectFailed {
        /// `user@host:port` the connection was attempted to.
        destination: String,
        /// Description of the failure.
        message: String,
    },

    /// The session was lost while a command was running.
    #[error("Session to {destination} lost: {message}")]
    Disconnected {
        /// `user@host:port` of the lost session.
        destination: String,
        /// Description of the failure.
        message: String,
    },

    /// The local process carrying the command could not be started.
    #[error("Failed to spawn command: {message}")]
    Spawn {
        /// Description of the failure.
        message: String,
    },
}

/// Exclusive target lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// The target is locked by another run.
    #[error("Target is locked by another run (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// The lock could not be created, refreshed or removed.
    #[error("Failed to manage target lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// The lock metadata on the target is unreadable.
    #[error("Target lock is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Plan has no steps.
    #[error("Plan is empty: no steps declared")]
    EmptyPlan,

    /// A step selected by name does not exist.
    #[error("Unknown step: {name}")]
    UnknownStep {
        /// The requested step name.
        name: String,
    },
}

/// Result type alias for hostprep operations.
pub type Result<T> = std::result::Result<T, HostprepError>;

impl HostprepError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Lock(LockError::LockFailed { .. }) => true,
            _ => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Transport(e) => e.retry_delay_secs(),
            Self::Lock(LockError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl TransportError {
    /// Creates a connect error.
    #[must_use]
    pub fn connect(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Creates a disconnected error.
    #[must_use]
    pub fn disconnected(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Disconnected {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Returns true if establishing the session again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Disconnected { .. })
    }

    /// Returns the suggested delay before reconnecting, in seconds.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::ConnectFailed { .. } => Some(5),
            Self::Disconnected { .. } => Some(2),
            Self::Spawn { .. } => None,
        }
    }
}

impl LockError {
    /// Creates a lock failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::LockFailed {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
