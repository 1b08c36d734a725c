//! Lock metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Information about a target lock, stored as `info.json` in the lock directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
    /// Fingerprint of the configuration being applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl LockInfo {
    /// Creates a new lock info valid for `expiry_secs`.
    #[must_use]
    pub fn new(holder: &str, expiry_secs: u64, fingerprint: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + lifetime(expiry_secs),
            fingerprint: fingerprint.map(str::to_string),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns true once half of the lifetime has elapsed.
    #[must_use]
    pub fn needs_refresh(&self, expiry_secs: u64) -> bool {
        self.remaining_secs() * 2 <= i64::try_from(expiry_secs).unwrap_or(i64::MAX)
    }

    /// Extends the lock by `expiry_secs` from now.
    pub fn refresh(&mut self, expiry_secs: u64) {
        self.expires_at = Utc::now() + lifetime(expiry_secs);
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

fn lifetime(expiry_secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::from(u32::try_from(expiry_secs).unwrap_or(u32::MAX)))
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("ci-runner", 600, Some("abc123"));
        assert_eq!(info.holder, "ci-runner");
        assert!(!info.is_expired());
        assert!(info.remaining_secs() > 500);
        assert!(!info.needs_refresh(600));
        assert_eq!(info.fingerprint.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_zero_lifetime_needs_refresh() {
        let mut info = LockInfo::new("ci-runner", 0, None);
        assert!(info.needs_refresh(0));

        info.refresh(600);
        assert!(!info.needs_refresh(600));
    }

    #[test]
    fn test_info_json_round_trip_without_fingerprint() {
        let info = LockInfo::new("laptop", 60, None);
        let json = serde_json::to_string(&info).expect("serialize");
        assert!(!json.contains("fingerprint"));

        let parsed: LockInfo = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        // IDs should be unique
        assert_ne!(id1, id2);

        let pid = std::process::id().to_string();
        assert!(id1.contains(&pid));
    }
}
