//! Installer and distribution-scheme configuration.
//!
//! The distribution scheme (manifest location, optional direct artifact
//! templating, triple naming) is configuration rather than code so a
//! deployment can point forgeup at its own artifact host without patching
//! the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Retry/backoff limits for network operations.
///
/// Injected into manifest resolution and downloads; `max_attempts` counts
/// the initial attempt, so the default allows three retries after the
/// first failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Where and how the distribution publishes manifests and artifacts.
///
/// URL fields are templates; `{channel}`, `{version}`, and `{triple}` are
/// replaced at resolution time. `{version}` expands to `latest` when no
/// version is pinned, so the host must serve a `latest` alias manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistConfig {
    /// Manifest document URL template
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,

    /// Direct artifact URL template. When set, a pinned version resolves
    /// without fetching the manifest.
    #[serde(default = "default_artifact_url", skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,

    /// Checksum sidecar URL template for directly-templated artifacts.
    /// The sidecar body is the hex sha-256 of the artifact. Without it,
    /// pinned resolution falls back to the manifest; downloads are never
    /// left unverified.
    #[serde(default = "default_checksum_url", skip_serializing_if = "Option::is_none")]
    pub checksum_url: Option<String>,
}

impl Default for DistConfig {
    fn default() -> Self {
        Self {
            manifest_url: default_manifest_url(),
            artifact_url: default_artifact_url(),
            checksum_url: default_checksum_url(),
        }
    }
}

impl DistConfig {
    /// Expand the manifest URL template.
    #[must_use]
    pub fn manifest_url_for(&self, channel: &str, version: &str) -> String {
        expand_template(&self.manifest_url, channel, version, "")
    }

    /// Expand the artifact URL template, if the scheme declares one.
    #[must_use]
    pub fn artifact_url_for(&self, channel: &str, version: &str, triple: &str) -> Option<String> {
        self.artifact_url
            .as_deref()
            .map(|t| expand_template(t, channel, version, triple))
    }

    /// Expand the checksum sidecar URL template, if the scheme declares one.
    #[must_use]
    pub fn checksum_url_for(&self, channel: &str, version: &str, triple: &str) -> Option<String> {
        self.checksum_url
            .as_deref()
            .map(|t| expand_template(t, channel, version, triple))
    }
}

/// Top-level installer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallerConfig {
    /// Release channel to install from
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Pinned version; `None` installs the channel's latest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Target triple override; `None` detects the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triple: Option<String>,

    /// Override of the cache root; defaults to the per-user cache dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_root: Option<PathBuf>,

    /// Per-request timeout in seconds for manifest and artifact fetches
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long to wait for another process's install before giving up,
    /// in seconds
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Retry/backoff limits
    #[serde(default)]
    pub retry: RetryConfig,

    /// Distribution scheme
    #[serde(default)]
    pub dist: DistConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            version: None,
            triple: None,
            cache_root: None,
            timeout_secs: default_timeout_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            retry: RetryConfig::default(),
            dist: DistConfig::default(),
        }
    }
}

/// Replace `{channel}`, `{version}`, and `{triple}` placeholders.
fn expand_template(template: &str, channel: &str, version: &str, triple: &str) -> String {
    template
        .replace("{channel}", channel)
        .replace("{version}", version)
        .replace("{triple}", triple)
}

// Default value functions

fn default_max_attempts() -> usize {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_manifest_url() -> String {
    "https://dist.forgeup.dev/{channel}/{version}/manifest.json".to_string()
}

fn default_artifact_url() -> Option<String> {
    Some("https://dist.forgeup.dev/{channel}/{version}/forge-{version}-{triple}.tar.gz".to_string())
}

fn default_checksum_url() -> Option<String> {
    Some(
        "https://dist.forgeup.dev/{channel}/{version}/forge-{version}-{triple}.tar.gz.sha256"
            .to_string(),
    )
}

fn default_channel() -> String {
    "stable".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_lock_timeout_secs() -> u64 {
    300
}
