//! Cross-process install locking.
//!
//! Serializes installation of a single cache key across processes using
//! exclusively-created lock files. Locks are released when the guard is
//! dropped, so a crashed holder leaves its file behind; staleness is
//! judged from the acquisition timestamp stored in the file, and stale
//! locks are broken so one dead process cannot wedge the cache forever.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Default lock acquisition timeout (5 minutes).
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default stale lock threshold (10 minutes).
pub const STALE_LOCK_THRESHOLD: Duration = Duration::from_secs(600);

/// Lock acquisition poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Metadata stored in a lock file.
#[derive(Debug, Clone)]
pub struct LockMetadata {
    /// Process ID that holds the lock.
    pub pid: u32,
    /// Unix timestamp when the lock was acquired.
    pub acquired_at: u64,
    /// Free-form owner description, for diagnostics.
    pub owner: String,
}

impl LockMetadata {
    fn serialize(&self) -> String {
        format!("{}:{}:{}", self.pid, self.acquired_at, self.owner)
    }

    fn deserialize(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        if parts.len() != 3 {
            return None;
        }
        Some(Self {
            pid: parts[0].parse().ok()?,
            acquired_at: parts[1].parse().ok()?,
            owner: parts[2].to_string(),
        })
    }
}

/// A lock currently held by another process.
#[derive(Debug, Clone, Copy)]
struct HeldBy {
    pid: u32,
    age_secs: u64,
}

/// File-based lock manager for toolchain installs.
///
/// One lock file per cache key lives under the cache's `locks/` directory.
/// Acquisition polls until the file can be created exclusively, the
/// timeout elapses, or the cancellation token fires.
#[derive(Debug, Clone)]
pub struct InstallLock {
    lock_dir: PathBuf,
    timeout: Duration,
    stale_threshold: Duration,
}

impl InstallLock {
    /// Create a lock manager storing lock files under `lock_dir`.
    #[must_use]
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            timeout: DEFAULT_LOCK_TIMEOUT,
            stale_threshold: STALE_LOCK_THRESHOLD,
        }
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the threshold past which an existing lock is considered stale.
    #[must_use]
    pub const fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    /// Acquire the lock for `key`, waiting until it is free.
    ///
    /// # Errors
    /// [`Error::LockTimeout`] when the timeout elapses while another
    /// process holds the lock, [`Error::Cancelled`] when the token fires
    /// while waiting, [`Error::LockFile`] on filesystem failures.
    pub async fn acquire(
        &self,
        key: &str,
        owner: &str,
        cancel: &CancellationToken,
    ) -> Result<LockGuard> {
        fs::create_dir_all(&self.lock_dir).map_err(|e| Error::lock_file(key, e))?;

        let lock_path = self.lock_path(key);
        let start = Instant::now();
        let metadata = LockMetadata {
            pid: std::process::id(),
            acquired_at: current_timestamp(),
            owner: owner.to_string(),
        };

        loop {
            match try_create(&lock_path, &metadata).map_err(|e| Error::lock_file(key, e))? {
                None => {
                    tracing::debug!(key = %key, owner = %owner, "Acquired install lock");
                    return Ok(LockGuard {
                        lock_path,
                        key: key.to_string(),
                    });
                }
                Some(held) => {
                    if Duration::from_secs(held.age_secs) > self.stale_threshold {
                        tracing::warn!(
                            key = %key,
                            holder_pid = held.pid,
                            age_secs = held.age_secs,
                            "Breaking stale install lock"
                        );
                        let _ = fs::remove_file(&lock_path);
                        continue;
                    }

                    if start.elapsed() >= self.timeout {
                        return Err(Error::lock_timeout(key, self.timeout.as_secs()));
                    }

                    tracing::debug!(
                        key = %key,
                        holder_pid = held.pid,
                        "Install lock held by another process, waiting"
                    );
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Try to acquire the lock without waiting.
    ///
    /// # Errors
    /// [`Error::LockTimeout`] (with a zero timeout) when the lock is held,
    /// [`Error::LockFile`] on filesystem failures.
    pub fn try_acquire(&self, key: &str, owner: &str) -> Result<LockGuard> {
        fs::create_dir_all(&self.lock_dir).map_err(|e| Error::lock_file(key, e))?;

        let lock_path = self.lock_path(key);
        let metadata = LockMetadata {
            pid: std::process::id(),
            acquired_at: current_timestamp(),
            owner: owner.to_string(),
        };

        match try_create(&lock_path, &metadata).map_err(|e| Error::lock_file(key, e))? {
            None => Ok(LockGuard {
                lock_path,
                key: key.to_string(),
            }),
            Some(_) => Err(Error::lock_timeout(key, 0)),
        }
    }

    /// Whether the lock for `key` is currently held.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.lock_path(key).exists()
    }

    /// Metadata of the current holder, if any.
    #[must_use]
    pub fn holder(&self, key: &str) -> Option<LockMetadata> {
        read_lock_metadata(&self.lock_path(key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        // Keys are derived from channel/version/triple; anything outside
        // the filesystem-safe set collapses to '_'.
        let safe_name: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.lock_dir.join(format!("{safe_name}.lock"))
    }
}

/// Attempt to create the lock file exclusively.
///
/// `Ok(None)` means the lock was acquired; `Ok(Some(_))` reports the
/// current holder. An unreadable lock file is removed and reported as an
/// anonymous holder so the caller retries.
fn try_create(lock_path: &Path, metadata: &LockMetadata) -> io::Result<Option<HeldBy>> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            file.write_all(metadata.serialize().as_bytes())?;
            Ok(None)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if let Some(existing) = read_lock_metadata(lock_path) {
                let age_secs = current_timestamp().saturating_sub(existing.acquired_at);
                Ok(Some(HeldBy {
                    pid: existing.pid,
                    age_secs,
                }))
            } else {
                // Unreadable or truncated lock file: remove it and retry.
                let _ = fs::remove_file(lock_path);
                Ok(Some(HeldBy {
                    pid: 0,
                    age_secs: 0,
                }))
            }
        }
        Err(e) => Err(e),
    }
}

/// Guard that releases the lock when dropped.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
    key: String,
}

impl LockGuard {
    /// The cache key this guard serializes.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(key = %self.key, error = %e, "Failed to release install lock");
            }
        } else {
            tracing::debug!(key = %self.key, "Released install lock");
        }
    }
}

fn read_lock_metadata(path: &Path) -> Option<LockMetadata> {
    let mut file = File::open(path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    LockMetadata::deserialize(&contents)
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn metadata_round_trips() {
        let metadata = LockMetadata {
            pid: 12345,
            acquired_at: 1_234_567_890,
            owner: "forgeup install".to_string(),
        };

        let restored = LockMetadata::deserialize(&metadata.serialize()).unwrap();
        assert_eq!(restored.pid, 12345);
        assert_eq!(restored.acquired_at, 1_234_567_890);
        assert_eq!(restored.owner, "forgeup install");
    }

    #[test]
    fn second_acquisition_fails_until_release() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path());

        let guard = lock.try_acquire("stable-1.2.0-x86_64", "first").unwrap();
        assert!(lock.is_locked("stable-1.2.0-x86_64"));
        assert!(lock.try_acquire("stable-1.2.0-x86_64", "second").is_err());

        drop(guard);
        assert!(!lock.is_locked("stable-1.2.0-x86_64"));
        let _guard = lock.try_acquire("stable-1.2.0-x86_64", "second").unwrap();
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path());

        let _a = lock.try_acquire("stable-1.2.0-a", "task").unwrap();
        let _b = lock.try_acquire("stable-1.2.0-b", "task").unwrap();
        assert!(lock.is_locked("stable-1.2.0-a"));
        assert!(lock.is_locked("stable-1.2.0-b"));
    }

    #[test]
    fn records_holder_metadata() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path());

        let _guard = lock.try_acquire("beta-2.0.0-x", "installer").unwrap();
        let holder = lock.holder("beta-2.0.0-x").unwrap();
        assert_eq!(holder.pid, std::process::id());
        assert_eq!(holder.owner, "installer");
    }

    #[test]
    fn sanitizes_keys_for_the_filesystem() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path());

        let _guard = lock.try_acquire("stable/1.2.0:odd", "task").unwrap();
        assert!(tmp.path().join("stable_1.2.0_odd.lock").exists());
    }

    #[tokio::test]
    async fn waits_then_times_out_while_held() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path()).with_timeout(Duration::from_millis(50));

        let _holder = lock.try_acquire("contended", "holder").unwrap();
        let err = lock
            .acquire("contended", "waiter", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn breaks_stale_locks() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path()).with_stale_threshold(Duration::from_secs(0));

        // Fake a holder that acquired long ago.
        let path = tmp.path().join("stale-key.lock");
        std::fs::write(&path, "999999:1:dead-process").unwrap();

        let guard = lock
            .acquire("stale-key", "reclaimer", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(guard.key(), "stale-key");
    }

    #[tokio::test]
    async fn cancellation_interrupts_waiting() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path()).with_timeout(Duration::from_secs(30));

        let _holder = lock.try_acquire("cancel-key", "holder").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = lock
            .acquire("cancel-key", "waiter", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn release_on_drop() {
        let tmp = TempDir::new().unwrap();
        let lock = InstallLock::new(tmp.path());

        {
            let _guard = lock.try_acquire("drop-key", "task").unwrap();
            assert!(lock.is_locked("drop-key"));
        }
        assert!(!lock.is_locked("drop-key"));
    }
}
