//! The install pipeline.
//!
//! A cache entry moves through a fixed lifecycle: absent, locked,
//! staging, publishing, published. The cross-process lock serializes
//! everything between absent and published, so concurrent installs of the
//! same key perform at most one download; losers of the race find the
//! receipt when they re-check after acquiring the lock and return the
//! existing entry. Any failure between staging and publishing deletes the
//! staging directory and releases the lock, leaving the entry absent.
//!
//! Pinned versions that are already published return without touching the
//! network; `latest` always fetches the manifest to learn what it points
//! at, then reuses the cache when that version is already installed.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activate::ActivationDescriptor;
use crate::cache::{CacheKey, InstallReceipt, ToolchainCache};
use crate::config::InstallerConfig;
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::extract;
use crate::lock::InstallLock;
use crate::manifest::{LATEST, ManifestResolver, ResolvedArtifact};
use crate::platform::HostTriple;
use crate::progress::Progress;

/// Age at which leftover downloads and staging directories are swept.
const ORPHAN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Installs forge toolchains into the shared cache.
#[derive(Debug, Clone)]
pub struct Installer {
    config: InstallerConfig,
    cache: ToolchainCache,
    client: reqwest::Client,
    progress: Progress,
    cancel: CancellationToken,
}

impl Installer {
    /// Create an installer from configuration.
    ///
    /// # Panics
    ///
    /// This function uses `expect` internally because
    /// `reqwest::Client::builder().build()` only fails with invalid TLS
    /// configuration, which cannot happen with the settings used here. The
    /// panic indicates a fundamental environment issue.
    #[must_use]
    pub fn new(config: InstallerConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(concat!("forgeup/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .expect("Failed to create HTTP client - TLS backend initialization failed");
        let cache = config
            .cache_root
            .clone()
            .map_or_else(ToolchainCache::default, ToolchainCache::new);
        Self {
            config,
            cache,
            client,
            progress: Progress::none(),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a progress callback for downloads.
    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancellation is honored between pipeline steps and inside lock
    /// waits, backoff sleeps, and download streaming; a cancelled install
    /// cleans up its staging state and returns [`Error::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cache this installer publishes into.
    #[must_use]
    pub fn cache(&self) -> &ToolchainCache {
        &self.cache
    }

    /// Install `version` of `channel` for `triple` and return how to
    /// activate it.
    ///
    /// `version` may be [`LATEST`] to follow the channel; `triple`
    /// defaults to the detected host platform. Already-installed pinned
    /// versions return without network traffic.
    ///
    /// # Errors
    /// Any [`Error`] from platform detection, manifest resolution,
    /// download, verification, extraction, locking, or publishing.
    pub async fn install(
        &self,
        channel: &str,
        version: &str,
        triple: Option<HostTriple>,
    ) -> Result<ActivationDescriptor> {
        let host = match triple {
            Some(triple) => triple,
            None => HostTriple::detect()?,
        };
        info!(channel, version, triple = %host, "Installing toolchain");

        // Pinned versions can be answered from the cache alone.
        if version != LATEST {
            let key = CacheKey::new(channel, version, host.to_string());
            if self.cache.is_published(&key) {
                info!(key = %key, "Toolchain already installed");
                return self.describe(&key);
            }
        }

        self.cache.ensure_dirs()?;

        let resolver = ManifestResolver::new(
            self.client.clone(),
            self.config.dist.clone(),
            self.config.retry.clone(),
        );
        let artifact = resolver
            .resolve(channel, version, &host, &self.cancel)
            .await?;
        let key = CacheKey::new(channel, artifact.version.clone(), host.to_string());

        // `latest` may have resolved to a version that is already on disk.
        if self.cache.is_published(&key) {
            info!(key = %key, "Resolved version already installed");
            return self.describe(&key);
        }

        let lock = InstallLock::new(self.cache.locks_dir())
            .with_timeout(Duration::from_secs(self.config.lock_timeout_secs));
        let _guard = lock
            .acquire(
                &key.to_string(),
                &format!("install {channel} {version}"),
                &self.cancel,
            )
            .await?;

        // Another process may have finished while we waited for the lock.
        if self.cache.is_published(&key) {
            info!(key = %key, "Toolchain installed by another process");
            return self.describe(&key);
        }
        // An unmarked directory here is a crashed install; clear it so the
        // publish rename cannot collide with it.
        self.cache.remove_entry(&key)?;
        if let Err(e) = self.cache.sweep_orphans(ORPHAN_MAX_AGE) {
            warn!(error = %e, "Orphan sweep failed");
        }

        let staging = self.download_and_stage(&artifact).await?;

        if self.cancel.is_cancelled() {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(Error::Cancelled);
        }

        let receipt = InstallReceipt::new(&key, artifact.sha256.to_ascii_lowercase());
        let dest = match self.cache.publish(&key, &staging, &receipt) {
            Ok(dest) => dest,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                let _ = self.cache.remove_entry(&key);
                return Err(e);
            }
        };

        info!(key = %key, dest = %dest.display(), "Toolchain installed");
        ActivationDescriptor::for_toolchain(&dest)
    }

    /// Install the toolchain the configuration names: its channel, its
    /// pinned version or the channel's latest, its triple override or
    /// the detected host.
    ///
    /// # Errors
    /// Same as [`Self::install`].
    pub async fn install_configured(&self) -> Result<ActivationDescriptor> {
        let version = self
            .config
            .version
            .clone()
            .unwrap_or_else(|| LATEST.to_string());
        let triple = HostTriple::resolve(self.config.triple.as_deref())?;
        self.install(&self.config.channel, &version, Some(triple))
            .await
    }

    /// Download, verify, and extract the artifact into a fresh staging
    /// directory on the cache volume.
    async fn download_and_stage(&self, artifact: &ResolvedArtifact) -> Result<PathBuf> {
        let downloader = Downloader::new(self.client.clone(), self.config.retry.clone());
        let archive = downloader
            .download(artifact, &self.cache.tmp_dir(), &self.progress, &self.cancel)
            .await?;

        if self.cancel.is_cancelled() {
            let _ = std::fs::remove_file(&archive);
            return Err(Error::Cancelled);
        }

        let staging = self.cache.staging_dir();
        let extracted = extract::extract(&archive, artifact.format, &staging);
        // The verified archive is spent either way.
        let _ = std::fs::remove_file(&archive);
        if let Err(e) = extracted {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        debug!(staging = %staging.display(), "Artifact staged");
        Ok(staging)
    }

    fn describe(&self, key: &CacheKey) -> Result<ActivationDescriptor> {
        ActivationDescriptor::for_toolchain(&self.cache.toolchain_dir(key))
    }
}
