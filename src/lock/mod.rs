//! Exclusive target locking.
//!
//! A run owns its target for its whole duration. Ownership is a lock
//! directory on the target itself (`mkdir` is atomic on every POSIX
//! filesystem), holding a small `info.json` describing the holder.

mod info;
mod remote;

use serde::{Deserialize, Serialize};

pub use info::{LockInfo, generate_holder_id};
pub use remote::TargetLock;

/// Default lock directory on the target.
pub const DEFAULT_LOCK_PATH: &str = "/tmp/hostprep.lock";

/// Default lock lifetime in seconds.
pub const DEFAULT_LOCK_EXPIRY_SECS: u64 = 3600;

/// Lock settings of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    /// Whether runs take the lock.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lock directory on the target.
    #[serde(default = "default_path")]
    pub path: String,
    /// Lifetime of a lock before another run may take it over.
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
            expiry_secs: default_expiry_secs(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    String::from(DEFAULT_LOCK_PATH)
}

const fn default_expiry_secs() -> u64 {
    DEFAULT_LOCK_EXPIRY_SECS
}
