//! On-disk toolchain cache.
//!
//! All state lives under one root so that staging directories, downloads,
//! and published toolchains share a filesystem and renames stay atomic:
//!
//! ```text
//! ~/.cache/forgeup/
//! ├── toolchains/
//! │   └── stable-1.2.0-x86_64-unknown-linux-gnu/
//! │       ├── .forgeup-receipt.json   # written last; marks the entry live
//! │       └── bin/...
//! ├── locks/
//! │   └── stable-1.2.0-x86_64-unknown-linux-gnu.lock
//! └── tmp/
//!     ├── dl-<pid>-<nonce>            # in-flight downloads
//!     └── stage-<pid>-<nonce>/        # extraction staging
//! ```
//!
//! A toolchain directory without a parseable receipt is treated as absent:
//! either a crashed install left it behind or the marker write never
//! happened, and in both cases the entry cannot be trusted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::Result;

/// Receipt schema version this build reads and writes.
pub const RECEIPT_SCHEMA_VERSION: u32 = 1;

/// Marker file name inside a published toolchain directory.
pub const RECEIPT_FILE: &str = ".forgeup-receipt.json";

/// Identity of one cache entry.
///
/// Two installs with equal keys refer to the same toolchain and must
/// serialize behind the same lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Release channel, e.g. `stable`.
    pub channel: String,
    /// Concrete version, never `latest`.
    pub version: String,
    /// Target triple the artifact was built for.
    pub triple: String,
}

impl CacheKey {
    /// Create a key from its parts.
    pub fn new(
        channel: impl Into<String>,
        version: impl Into<String>,
        triple: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            version: version.into(),
            triple: triple.into(),
        }
    }

    /// Directory-safe rendering of the key.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}-{}-{}", self.channel, self.version, self.triple)
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.channel, self.version, self.triple)
    }
}

/// Marker recording a completed install.
///
/// Written into the toolchain directory after the publish rename; its
/// presence is what makes an entry `Published`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReceipt {
    /// Receipt format version.
    pub schema_version: u32,
    /// Release channel.
    pub channel: String,
    /// Installed version.
    pub version: String,
    /// Target triple.
    pub triple: String,
    /// Hex sha-256 of the archive this entry was extracted from.
    pub sha256: String,
    /// Unix timestamp of the install.
    pub installed_at: u64,
}

impl InstallReceipt {
    /// Create a receipt for a freshly installed entry.
    #[must_use]
    pub fn new(key: &CacheKey, sha256: impl Into<String>) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            channel: key.channel.clone(),
            version: key.version.clone(),
            triple: key.triple.clone(),
            sha256: sha256.into(),
            installed_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Handle to the cache root.
///
/// Default location: `~/.cache/forgeup/`.
#[derive(Debug, Clone)]
pub struct ToolchainCache {
    root: PathBuf,
}

impl Default for ToolchainCache {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("forgeup");
        Self::new(cache_dir)
    }
}

impl ToolchainCache {
    /// Create a cache at the specified root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding published toolchains.
    #[must_use]
    pub fn toolchains_dir(&self) -> PathBuf {
        self.root.join("toolchains")
    }

    /// Directory holding install lock files.
    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Scratch directory for downloads and staging, on the cache volume.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Final directory for one cache entry.
    #[must_use]
    pub fn toolchain_dir(&self, key: &CacheKey) -> PathBuf {
        self.toolchains_dir().join(key.dir_name())
    }

    /// Receipt path for one cache entry.
    #[must_use]
    pub fn receipt_path(&self, key: &CacheKey) -> PathBuf {
        self.toolchain_dir(key).join(RECEIPT_FILE)
    }

    /// A process-unique staging directory path under `tmp/`.
    ///
    /// The path is not created; extraction creates it on first use.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.tmp_dir().join(format!(
            "stage-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    /// Ensure the cache directory skeleton exists.
    ///
    /// # Errors
    /// Propagates filesystem errors.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.toolchains_dir())?;
        std::fs::create_dir_all(self.locks_dir())?;
        std::fs::create_dir_all(self.tmp_dir())?;
        Ok(())
    }

    /// Look up a published entry.
    ///
    /// Returns the receipt only when the marker exists and parses; a
    /// directory with a missing or corrupt receipt reads as absent.
    #[must_use]
    pub fn lookup(&self, key: &CacheKey) -> Option<InstallReceipt> {
        let receipt = read_receipt(&self.receipt_path(key));
        if receipt.is_some() {
            trace!(key = %key, "Cache hit");
        }
        receipt
    }

    /// Whether a published entry exists for `key`.
    #[must_use]
    pub fn is_published(&self, key: &CacheKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Receipts of every published entry, newest install first.
    ///
    /// Unmarked directories are skipped, same as [`Self::lookup`].
    ///
    /// # Errors
    /// Propagates filesystem errors from listing the toolchains
    /// directory; a missing directory reads as empty.
    pub fn receipts(&self) -> Result<Vec<InstallReceipt>> {
        let entries = match std::fs::read_dir(self.toolchains_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut receipts = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(receipt) = read_receipt(&entry.path().join(RECEIPT_FILE)) {
                receipts.push(receipt);
            }
        }
        receipts.sort_by(|a, b| b.installed_at.cmp(&a.installed_at));
        Ok(receipts)
    }

    /// Publish a staged toolchain: rename it into place, then write the
    /// receipt.
    ///
    /// The rename is the commit point for the directory contents; the
    /// receipt write makes the entry visible to [`Self::lookup`]. Both the
    /// staging directory and the destination are on the cache volume, so
    /// the rename never degrades into a copy.
    ///
    /// # Errors
    /// Propagates filesystem errors. On failure the destination may hold
    /// an unmarked directory, which later reads as absent.
    pub fn publish(
        &self,
        key: &CacheKey,
        staging: &Path,
        receipt: &InstallReceipt,
    ) -> Result<PathBuf> {
        let dest = self.toolchain_dir(key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(staging, &dest)?;
        self.write_receipt(key, receipt)?;
        debug!(key = %key, dest = %dest.display(), "Published toolchain");
        Ok(dest)
    }

    /// Write the receipt marker atomically (temp file plus rename).
    fn write_receipt(&self, key: &CacheKey, receipt: &InstallReceipt) -> Result<()> {
        let path = self.receipt_path(key);
        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        let body = serde_json::to_vec_pretty(receipt)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove a cache entry, marked or not.
    ///
    /// Used to clear unmarked leftovers before a reinstall.
    ///
    /// # Errors
    /// Propagates filesystem errors other than the entry being absent.
    pub fn remove_entry(&self, key: &CacheKey) -> Result<()> {
        let dir = self.toolchain_dir(key);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(key = %key, "Removed cache entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete leftovers from crashed installs.
    ///
    /// Removes `tmp/` entries and unmarked toolchain directories older
    /// than `max_age`. Entries younger than that may belong to a running
    /// install and are left alone.
    ///
    /// # Errors
    /// Propagates filesystem errors from directory listing; individual
    /// removals are best-effort.
    pub fn sweep_orphans(&self, max_age: Duration) -> Result<()> {
        sweep_dir(&self.tmp_dir(), max_age, |_| true)?;
        sweep_dir(&self.toolchains_dir(), max_age, |path| {
            !path.join(RECEIPT_FILE).exists()
        })?;
        Ok(())
    }
}

/// Read and validate a receipt marker. Missing, corrupt, and
/// unknown-schema markers all read as `None`.
fn read_receipt(path: &Path) -> Option<InstallReceipt> {
    let contents = std::fs::read(path).ok()?;
    match serde_json::from_slice::<InstallReceipt>(&contents) {
        Ok(receipt) if receipt.schema_version == RECEIPT_SCHEMA_VERSION => Some(receipt),
        Ok(receipt) => {
            warn!(
                path = %path.display(),
                schema_version = receipt.schema_version,
                "Ignoring receipt with unknown schema version"
            );
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt receipt");
            None
        }
    }
}

/// Remove entries of `dir` older than `max_age` for which `orphaned`
/// returns true. A missing `dir` is fine.
fn sweep_dir(
    dir: &Path,
    max_age: Duration,
    orphaned: impl Fn(&Path) -> bool,
) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !orphaned(&path) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age >= max_age) {
            debug!(path = %path.display(), "Sweeping orphaned cache entry");
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "Failed to sweep orphan");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::new("stable", "1.2.0", "x86_64-unknown-linux-gnu")
    }

    #[test]
    fn lays_out_paths_under_the_root() {
        let cache = ToolchainCache::new("/tmp/forgeup-cache");
        let key = key();

        assert_eq!(
            cache.toolchain_dir(&key),
            PathBuf::from("/tmp/forgeup-cache/toolchains/stable-1.2.0-x86_64-unknown-linux-gnu")
        );
        assert_eq!(
            cache.receipt_path(&key),
            cache.toolchain_dir(&key).join(".forgeup-receipt.json")
        );
        assert_eq!(cache.locks_dir(), PathBuf::from("/tmp/forgeup-cache/locks"));
        assert_eq!(cache.tmp_dir(), PathBuf::from("/tmp/forgeup-cache/tmp"));
    }

    #[test]
    fn staging_paths_are_unique() {
        let cache = ToolchainCache::new("/tmp/forgeup-cache");
        assert_ne!(cache.staging_dir(), cache.staging_dir());
    }

    #[test]
    fn dir_name_is_filesystem_safe() {
        let key = CacheKey::new("nightly/odd", "1.0.0+build", "x86_64-unknown-linux-gnu");
        assert_eq!(
            key.dir_name(),
            "nightly_odd-1.0.0_build-x86_64-unknown-linux-gnu"
        );
    }

    #[test]
    fn default_root_is_under_the_user_cache() {
        let cache = ToolchainCache::default();
        assert!(cache.root().to_string_lossy().contains("forgeup"));
    }

    #[test]
    fn publish_renames_staging_and_writes_receipt() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        cache.ensure_dirs().unwrap();
        let key = key();

        let staging = cache.staging_dir();
        std::fs::create_dir_all(staging.join("bin")).unwrap();
        std::fs::write(staging.join("bin").join("forge"), b"#!/bin/sh\n").unwrap();

        let receipt = InstallReceipt::new(&key, "a".repeat(64));
        let dest = cache.publish(&key, &staging, &receipt).unwrap();

        assert!(!staging.exists());
        assert!(dest.join("bin").join("forge").exists());
        let restored = cache.lookup(&key).unwrap();
        assert_eq!(restored.version, "1.2.0");
        assert_eq!(restored.sha256, "a".repeat(64));
    }

    #[test]
    fn lookup_treats_missing_receipt_as_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        let key = key();

        std::fs::create_dir_all(cache.toolchain_dir(&key)).unwrap();
        assert!(cache.lookup(&key).is_none());
        assert!(!cache.is_published(&key));
    }

    #[test]
    fn lookup_treats_corrupt_receipt_as_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        let key = key();

        std::fs::create_dir_all(cache.toolchain_dir(&key)).unwrap();
        std::fs::write(cache.receipt_path(&key), b"not json {{").unwrap();
        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn lookup_rejects_unknown_schema_versions() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        let key = key();

        let mut receipt = InstallReceipt::new(&key, "b".repeat(64));
        receipt.schema_version = 99;
        std::fs::create_dir_all(cache.toolchain_dir(&key)).unwrap();
        std::fs::write(
            cache.receipt_path(&key),
            serde_json::to_vec(&receipt).unwrap(),
        )
        .unwrap();
        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn receipts_lists_published_entries_newest_first() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        cache.ensure_dirs().unwrap();

        let write = |version: &str, installed_at: u64| {
            let key = CacheKey::new("stable", version, "x86_64-unknown-linux-gnu");
            let mut receipt = InstallReceipt::new(&key, "d".repeat(64));
            receipt.installed_at = installed_at;
            std::fs::create_dir_all(cache.toolchain_dir(&key)).unwrap();
            std::fs::write(
                cache.receipt_path(&key),
                serde_json::to_vec(&receipt).unwrap(),
            )
            .unwrap();
        };
        write("1.0.0", 100);
        write("1.1.0", 200);

        // Unmarked directory must not show up.
        std::fs::create_dir_all(cache.toolchains_dir().join("stable-9.9.9-leftover")).unwrap();

        let receipts = cache.receipts().unwrap();
        let versions: Vec<&str> = receipts.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["1.1.0", "1.0.0"]);
    }

    #[test]
    fn receipts_on_a_fresh_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path().join("never-created"));
        assert!(cache.receipts().unwrap().is_empty());
    }

    #[test]
    fn remove_entry_clears_published_and_tolerates_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        let key = key();

        std::fs::create_dir_all(cache.toolchain_dir(&key)).unwrap();
        cache.remove_entry(&key).unwrap();
        assert!(!cache.toolchain_dir(&key).exists());

        // Absent entry is not an error.
        cache.remove_entry(&key).unwrap();
    }

    #[test]
    fn sweep_removes_old_tmp_and_unmarked_dirs() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        cache.ensure_dirs().unwrap();
        let key = key();

        // Orphaned download, orphaned staging dir, unmarked toolchain dir.
        std::fs::write(cache.tmp_dir().join("dl-999-old"), b"partial").unwrap();
        std::fs::create_dir_all(cache.tmp_dir().join("stage-999-old")).unwrap();
        std::fs::create_dir_all(cache.toolchain_dir(&key)).unwrap();

        // Published entry that must survive.
        let published = CacheKey::new("stable", "2.0.0", "x86_64-unknown-linux-gnu");
        std::fs::create_dir_all(cache.toolchain_dir(&published)).unwrap();
        let receipt = InstallReceipt::new(&published, "c".repeat(64));
        std::fs::write(
            cache.receipt_path(&published),
            serde_json::to_vec(&receipt).unwrap(),
        )
        .unwrap();

        cache.sweep_orphans(Duration::ZERO).unwrap();

        assert!(!cache.tmp_dir().join("dl-999-old").exists());
        assert!(!cache.tmp_dir().join("stage-999-old").exists());
        assert!(!cache.toolchain_dir(&key).exists());
        assert!(cache.toolchain_dir(&published).exists());
        assert!(cache.is_published(&published));
    }

    #[test]
    fn sweep_keeps_entries_younger_than_max_age() {
        let tmp = TempDir::new().unwrap();
        let cache = ToolchainCache::new(tmp.path());
        cache.ensure_dirs().unwrap();

        std::fs::write(cache.tmp_dir().join("dl-123-live"), b"in flight").unwrap();
        cache.sweep_orphans(Duration::from_secs(24 * 60 * 60)).unwrap();
        assert!(cache.tmp_dir().join("dl-123-live").exists());
    }
}
