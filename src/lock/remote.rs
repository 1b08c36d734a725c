//! Lock directory on the target.

use tracing::{debug, info, warn};

use crate::error::LockError;
use crate::remote::shell::{quote, quote_path};
use crate::remote::{Command, ExecutionResult, RemoteExecutor};

use super::LockSettings;
use super::info::{LockInfo, generate_holder_id};

/// Exit status of the acquire script when the directory already exists.
const HELD_EXIT_CODE: i32 = 3;

/// Exit status of the inspect script when there is no lock directory.
const ABSENT_EXIT_CODE: i32 = 3;

/// Exit status of the takeover script when another run got there first.
const LOST_RACE_EXIT_CODE: i32 = 3;

/// Suffix of the directory serializing takeovers of an expired lock.
const TAKEOVER_SUFFIX: &str = ".takeover";

/// Rounds of create, inspect and takeover before giving up.
const ACQUIRE_ATTEMPTS: usize = 3;

/// A lock held by this process on a target.
#[derive(Debug)]
pub struct TargetLock {
    info: LockInfo,
    settings: LockSettings,
}

impl TargetLock {
    /// Takes the target lock.
    ///
    /// An expired lock left by another run is taken over. Takeovers are
    /// serialized on the target and only replace the exact lock that was
    /// seen expired, so two runs racing for the same stale lock never both
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns `LockedByOther` if an unexpired lock exists or another run
    /// won the takeover, `Corrupted` if an existing lock cannot be read, and
    /// `LockFailed` if the target cannot be reached or written.
    pub async fn acquire(
        executor: &RemoteExecutor<'_>,
        settings: &LockSettings,
        fingerprint: Option<&str>,
    ) -> Result<Self, LockError> {
        let lock = Self {
            info: LockInfo::new(&generate_holder_id(), settings.expiry_secs, fingerprint),
            settings: settings.clone(),
        };

        for _ in 0..ACQUIRE_ATTEMPTS {
            if lock.create(executor).await? {
                info!("Acquired target lock {} as {}", settings.path, lock.info.holder);
                return Ok(lock);
            }

            let Some(existing) = Self::inspect(executor, settings).await? else {
                debug!("Target lock {} released while being acquired, retrying", settings.path);
                continue;
            };

            if !existing.is_expired() {
                return Err(LockError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                });
            }

            if lock.take_over(executor, &existing).await? {
                warn!(
                    "Took over expired lock held by {} since {}",
                    existing.holder, existing.acquired_at
                );
                return Ok(lock);
            }
            debug!("Lost the takeover of {} to another run", settings.path);
        }

        match Self::inspect(executor, settings).await? {
            Some(current) => Err(LockError::LockedByOther {
                holder: current.holder,
                since: current.acquired_at.to_rfc3339(),
            }),
            None => Err(LockError::failed("lock kept changing hands while being acquired")),
        }
    }

    /// Reads the lock currently on the target, if any.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the lock directory exists without readable
    /// metadata, and `LockFailed` if the target cannot be reached.
    pub async fn inspect(executor: &RemoteExecutor<'_>, settings: &LockSettings) -> Result<Option<LockInfo>, LockError> {
        let dir = quote_path(&settings.path);
        let script = format!("if [ -d {dir} ]; then cat -- {dir}/info.json; else exit {ABSENT_EXIT_CODE}; fi");
        let result = run(executor, Command::new(script)).await?;

        match result.exit_code {
            Some(0) => serde_json::from_str(&result.stdout)
                .map(Some)
                .map_err(|e| LockError::corrupted(format!("{}: {e}", settings.path))),
            Some(ABSENT_EXIT_CODE) => Ok(None),
            _ => Err(LockError::corrupted(format!(
                "{} exists without metadata ({})",
                settings.path,
                result.summary()
            ))),
        }
    }

    /// Removes the lock directory whoever holds it.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the directory cannot be removed.
    pub async fn force_release(executor: &RemoteExecutor<'_>, settings: &LockSettings) -> Result<(), LockError> {
        let script = format!(
            "rm -rf -- {} {}",
            quote_path(&settings.path),
            quote_path(&format!("{}{TAKEOVER_SUFFIX}", settings.path))
        );
        let result = run(executor, Command::new(script)).await?;
        if result.succeeded {
            info!("Removed target lock {}", settings.path);
            Ok(())
        } else {
            Err(LockError::failed(format!("cannot remove lock: {}", result.summary())))
        }
    }

    /// Returns the lock metadata.
    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Extends the lock once half of its lifetime has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `LockFailed` if the metadata cannot be rewritten.
    pub async fn refresh_if_needed(&mut self, executor: &RemoteExecutor<'_>) -> Result<(), LockError> {
        if !self.info.needs_refresh(self.settings.expiry_secs) {
            return Ok(());
        }
        self.info.refresh(self.settings.expiry_secs);
        debug!("Refreshing target lock until {}", self.info.expires_at);
        self.write(executor).await
    }

    /// Releases the lock.
    ///
    /// A lock that was taken over by another run in the meantime is left in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be read or removed.
    pub async fn release(self, executor: &RemoteExecutor<'_>) -> Result<(), LockError> {
        match Self::inspect(executor, &self.settings).await? {
            Some(current) if current.lock_id == self.info.lock_id => {
                Self::force_release(executor, &self.settings).await
            }
            Some(current) => {
                warn!("Target lock now held by {}, leaving it in place", current.holder);
                Ok(())
            }
            None => {
                warn!("Target lock {} was already removed", self.settings.path);
                Ok(())
            }
        }
    }

    /// Creates the lock directory with this lock's metadata.
    ///
    /// Returns false if the directory already exists.
    async fn create(&self, executor: &RemoteExecutor<'_>) -> Result<bool, LockError> {
        let dir = quote_path(&self.settings.path);
        let script = format!(
            "if mkdir -- {dir} 2>/dev/null; then cat > {dir}/info.json; else exit {HELD_EXIT_CODE}; fi"
        );

        let result = run(executor, Command::new(script).stdin(self.encode()?)).await?;
        match result.exit_code {
            Some(0) => Ok(true),
            Some(HELD_EXIT_CODE) => Ok(false),
            _ => Err(LockError::failed(format!("cannot create lock: {}", result.summary()))),
        }
    }

    /// Replaces `stale` with this lock if it is still the one on the target.
    ///
    /// Returns false if another run changed the lock first.
    async fn take_over(&self, executor: &RemoteExecutor<'_>, stale: &LockInfo) -> Result<bool, LockError> {
        let dir = quote_path(&self.settings.path);
        let guard = quote_path(&format!("{}{TAKEOVER_SUFFIX}", self.settings.path));
        let stale_id = quote(&stale.lock_id);
        let script = format!(
            "mkdir -- {guard} 2>/dev/null || exit {LOST_RACE_EXIT_CODE}\n\
             if grep -qF -- {stale_id} {dir}/info.json 2>/dev/null; then\n\
             cat > {dir}/info.json.tmp && mv -f -- {dir}/info.json.tmp {dir}/info.json; status=$?\n\
             else status={LOST_RACE_EXIT_CODE}; fi\n\
             rmdir -- {guard}\n\
             exit $status"
        );

        let result = run(executor, Command::new(script).stdin(self.encode()?)).await?;
        match result.exit_code {
            Some(0) => Ok(true),
            Some(LOST_RACE_EXIT_CODE) => Ok(false),
            _ => Err(LockError::failed(format!("cannot take over lock: {}", result.summary()))),
        }
    }

    async fn write(&self, executor: &RemoteExecutor<'_>) -> Result<(), LockError> {
        let dir = quote_path(&self.settings.path);
        let script = format!(
            "mkdir -p -- {dir} && cat > {dir}/info.json.tmp && mv -f -- {dir}/info.json.tmp {dir}/info.json"
        );

        let result = run(executor, Command::new(script).stdin(self.encode()?)).await?;
        if result.succeeded {
            Ok(())
        } else {
            Err(LockError::failed(format!("cannot write lock: {}", result.summary())))
        }
    }

    fn encode(&self) -> Result<Vec<u8>, LockError> {
        serde_json::to_vec(&self.info).map_err(|e| LockError::failed(e.to_string()))
    }
}

async fn run(executor: &RemoteExecutor<'_>, command: Command) -> Result<ExecutionResult, LockError> {
    executor
        .execute(&command)
        .await
        .map_err(|e| LockError::failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Connector, LocalConnector, Target, Transport};
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: LockSettings,
        target: Target,
        transport: Box<dyn Transport>,
    }

    async fn fixture(expiry_secs: u64) -> Fixture {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let settings = LockSettings {
            enabled: true,
            path: dir.path().join("hostprep.lock").display().to_string(),
            expiry_secs,
        };
        let target = Target::local();
        let transport = LocalConnector::new().connect(&target).await.expect("local connect");
        Fixture {
            _dir: dir,
            settings,
            target,
            transport,
        }
    }

    #[tokio::test]
    async fn test_second_acquire_is_refused_until_release() {
        let fx = fixture(600).await;
        let executor = RemoteExecutor::new(fx.transport.as_ref(), &fx.target);

        let lock = TargetLock::acquire(&executor, &fx.settings, Some("f1")).await.expect("first acquire");

        let err = TargetLock::acquire(&executor, &fx.settings, None)
            .await
            .expect_err("second acquire must fail");
        assert!(matches!(err, LockError::LockedByOther { ref holder, .. } if *holder == lock.info().holder));

        let seen = TargetLock::inspect(&executor, &fx.settings).await.expect("inspect");
        assert_eq!(seen.and_then(|i| i.fingerprint).as_deref(), Some("f1"));

        lock.release(&executor).await.expect("release");
        assert!(TargetLock::inspect(&executor, &fx.settings).await.expect("inspect").is_none());

        let again = TargetLock::acquire(&executor, &fx.settings, None).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let fx = fixture(0).await;
        let executor = RemoteExecutor::new(fx.transport.as_ref(), &fx.target);

        let stale = TargetLock::acquire(&executor, &fx.settings, None).await.expect("first acquire");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fresh = TargetLock::acquire(&executor, &fx.settings, None).await.expect("takeover");
        assert_ne!(fresh.info().lock_id, stale.info().lock_id);

        // The stale holder must not remove the new holder's lock.
        stale.release(&executor).await.expect("stale release");
        let current = TargetLock::inspect(&executor, &fx.settings).await.expect("inspect");
        assert_eq!(current.map(|i| i.lock_id), Some(fresh.info().lock_id.clone()));
    }

    #[tokio::test]
    async fn test_racing_takeovers_of_an_expired_lock_admit_one_run() {
        let fx = fixture(600).await;
        let stale_settings = LockSettings {
            expiry_secs: 0,
            ..fx.settings.clone()
        };
        let other = LocalConnector::new().connect(&fx.target).await.expect("local connect");
        let first = RemoteExecutor::new(fx.transport.as_ref(), &fx.target);
        let second = RemoteExecutor::new(other.as_ref(), &fx.target);

        for round in 0..20 {
            let stale = TargetLock::acquire(&first, &stale_settings, None).await.expect("stale acquire");
            tokio::time::sleep(Duration::from_millis(5)).await;

            let (a, b) = tokio::join!(
                TargetLock::acquire(&first, &fx.settings, None),
                TargetLock::acquire(&second, &fx.settings, None)
            );

            let winners: Vec<TargetLock> = [a, b].into_iter().filter_map(Result::ok).collect();
            assert_eq!(winners.len(), 1, "round {round}: exactly one run may take over");

            let current = TargetLock::inspect(&first, &fx.settings)
                .await
                .expect("inspect")
                .expect("lock present");
            assert_eq!(current.lock_id, winners[0].info().lock_id);
            assert_ne!(current.lock_id, stale.info().lock_id);

            TargetLock::force_release(&first, &fx.settings).await.expect("reset");
        }
    }

    #[tokio::test]
    async fn test_takeover_is_refused_while_another_is_in_progress() {
        let fx = fixture(600).await;
        let executor = RemoteExecutor::new(fx.transport.as_ref(), &fx.target);
        let stale_settings = LockSettings {
            expiry_secs: 0,
            ..fx.settings.clone()
        };

        let stale = TargetLock::acquire(&executor, &stale_settings, None).await.expect("stale acquire");
        tokio::time::sleep(Duration::from_millis(5)).await;
        std::fs::create_dir(format!("{}{TAKEOVER_SUFFIX}", fx.settings.path)).expect("takeover guard");

        let err = TargetLock::acquire(&executor, &fx.settings, None)
            .await
            .expect_err("guard held by another run");
        assert!(matches!(err, LockError::LockedByOther { ref holder, .. } if *holder == stale.info().holder));

        TargetLock::force_release(&executor, &fx.settings).await.expect("force release");
        assert!(!std::path::Path::new(&format!("{}{TAKEOVER_SUFFIX}", fx.settings.path)).exists());
    }

    #[tokio::test]
    async fn test_directory_without_metadata_is_corrupted() {
        let fx = fixture(600).await;
        std::fs::create_dir(&fx.settings.path).expect("create lock dir");
        let executor = RemoteExecutor::new(fx.transport.as_ref(), &fx.target);

        let err = TargetLock::inspect(&executor, &fx.settings).await.expect_err("no info.json");
        assert!(matches!(err, LockError::Corrupted { .. }));

        TargetLock::force_release(&executor, &fx.settings).await.expect("force release");
        assert!(!std::path::Path::new(&fx.settings.path).exists());
    }

    #[tokio::test]
    async fn test_refresh_rewrites_expiry() {
        let fx = fixture(0).await;
        let executor = RemoteExecutor::new(fx.transport.as_ref(), &fx.target);

        let mut lock = TargetLock::acquire(&executor, &fx.settings, None).await.expect("acquire");
        let before = lock.info().expires_at;
        tokio::time::sleep(Duration::from_millis(5)).await;

        lock.refresh_if_needed(&executor).await.expect("refresh");
        let stored = TargetLock::inspect(&executor, &fx.settings)
            .await
            .expect("inspect")
            .expect("lock present");
        assert!(stored.expires_at > before);
        assert_eq!(stored.lock_id, lock.info().lock_id);
    }
}
