//! Release manifest resolution.
//!
//! A manifest is a JSON document enumerating, for one channel and version,
//! the artifact per target triple:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "channel": "stable",
//!   "version": "1.2.0",
//!   "artifacts": {
//!     "x86_64-unknown-linux-gnu": {
//!       "url": "https://dist.forgeup.dev/stable/1.2.0/forge-1.2.0-x86_64-unknown-linux-gnu.tar.gz",
//!       "sha256": "0123...cdef",
//!       "format": "tar.gz"
//!     }
//!   }
//! }
//! ```
//!
//! Manifests are fetched fresh per invocation and never persisted. When a
//! version is pinned and the distribution scheme declares artifact and
//! checksum URL templates, resolution skips the manifest fetch entirely.

use crate::config::{DistConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::extract::ArchiveFormat;
use crate::platform::HostTriple;
use crate::retry::retry_with_backoff;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Manifest schema revision this resolver understands.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Version argument selecting whatever the channel currently advertises.
pub const LATEST: &str = "latest";

/// Parsed release manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainManifest {
    /// Schema revision of the document.
    pub schema_version: u32,
    /// Channel the manifest describes.
    pub channel: String,
    /// Concrete version the manifest describes.
    pub version: String,
    /// Artifact per target triple.
    pub artifacts: BTreeMap<String, ManifestArtifact>,
}

/// One downloadable artifact within a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestArtifact {
    /// Download URL.
    pub url: String,
    /// Hex sha-256 of the archive.
    pub sha256: String,
    /// Container format of the archive.
    pub format: ArchiveFormat,
}

/// Outcome of resolution: everything the download stage needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Download URL.
    pub url: String,
    /// Expected hex sha-256 of the archive.
    pub sha256: String,
    /// Container format of the archive.
    pub format: ArchiveFormat,
    /// Concrete version this artifact belongs to (`latest` resolved).
    pub version: String,
}

/// Resolves (channel, version, triple) to a concrete artifact.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    client: reqwest::Client,
    dist: DistConfig,
    retry: RetryConfig,
}

impl ManifestResolver {
    /// Create a resolver using the given HTTP client and scheme.
    #[must_use]
    pub fn new(client: reqwest::Client, dist: DistConfig, retry: RetryConfig) -> Self {
        Self {
            client,
            dist,
            retry,
        }
    }

    /// Resolve the artifact for `triple` on `channel`.
    ///
    /// `version` is either a pinned version string or [`LATEST`]. Pinned
    /// versions resolve without a manifest fetch when the distribution
    /// scheme declares both artifact and checksum URL templates; the
    /// checksum sidecar is still fetched so the download can be verified.
    ///
    /// # Errors
    /// [`Error::ManifestFetch`] after retries for network/HTTP failures,
    /// [`Error::ManifestParse`] for malformed documents,
    /// [`Error::TripleNotFound`] when the manifest has no entry for the
    /// triple.
    pub async fn resolve(
        &self,
        channel: &str,
        version: &str,
        triple: &HostTriple,
        cancel: &CancellationToken,
    ) -> Result<ResolvedArtifact> {
        let pinned = version != LATEST;
        if pinned {
            if let Some(artifact) = self.resolve_templated(channel, version, triple, cancel).await?
            {
                return Ok(artifact);
            }
        }
        self.resolve_from_manifest(channel, version, triple, cancel)
            .await
    }

    /// Deterministic resolution from URL templates, without a manifest.
    ///
    /// Returns `Ok(None)` when the scheme does not declare both templates;
    /// verification is mandatory, so an artifact template without a
    /// checksum template falls back to the manifest path.
    async fn resolve_templated(
        &self,
        channel: &str,
        version: &str,
        triple: &HostTriple,
        cancel: &CancellationToken,
    ) -> Result<Option<ResolvedArtifact>> {
        let triple_s = triple.to_string();
        let (Some(url), Some(checksum_url)) = (
            self.dist.artifact_url_for(channel, version, &triple_s),
            self.dist.checksum_url_for(channel, version, &triple_s),
        ) else {
            return Ok(None);
        };

        debug!(%url, "Resolving pinned version from URL template");
        let format = ArchiveFormat::from_path(&url)?;
        let body = retry_with_backoff(&self.retry, cancel, "checksum_fetch", || {
            self.fetch_text(&checksum_url, cancel)
        })
        .await?;
        let sha256 = parse_checksum_body(&checksum_url, &body)?;

        Ok(Some(ResolvedArtifact {
            url,
            sha256,
            format,
            version: version.to_string(),
        }))
    }

    /// Fetch the manifest document and look the triple up in it.
    async fn resolve_from_manifest(
        &self,
        channel: &str,
        version: &str,
        triple: &HostTriple,
        cancel: &CancellationToken,
    ) -> Result<ResolvedArtifact> {
        let url = self.dist.manifest_url_for(channel, version);
        info!(%url, channel, version, "Fetching release manifest");

        let body = retry_with_backoff(&self.retry, cancel, "manifest_fetch", || {
            self.fetch_text(&url, cancel)
        })
        .await?;
        let manifest = parse_manifest(&url, &body)?;

        if version != LATEST && manifest.version != version {
            return Err(Error::manifest_parse(
                &url,
                format!(
                    "document is for version '{}', requested '{}'",
                    manifest.version, version
                ),
            ));
        }

        let triple_s = triple.to_string();
        let artifact = manifest.artifacts.get(&triple_s).ok_or_else(|| {
            Error::triple_not_found(&triple_s, channel, manifest.version.clone())
        })?;

        Ok(ResolvedArtifact {
            url: artifact.url.clone(),
            sha256: artifact.sha256.clone(),
            format: artifact.format,
            version: manifest.version.clone(),
        })
    }

    /// One GET attempt returning the response body as text.
    async fn fetch_text(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::manifest_transport(url, &e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::manifest_status(url, status.as_u16()));
            }
            response
                .text()
                .await
                .map_err(|e| Error::manifest_transport(url, &e))
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = request => result,
        }
    }
}

/// Parse and validate a manifest document.
fn parse_manifest(url: &str, body: &str) -> Result<ToolchainManifest> {
    let manifest: ToolchainManifest =
        serde_json::from_str(body).map_err(|e| Error::manifest_parse(url, e.to_string()))?;
    if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(Error::manifest_parse(
            url,
            format!(
                "unsupported schema version {} (expected {MANIFEST_SCHEMA_VERSION})",
                manifest.schema_version
            ),
        ));
    }
    Ok(manifest)
}

/// Extract the hex digest from a checksum sidecar body.
///
/// Accepts both a bare digest and the `sha256sum` two-column format
/// (`<hex>  <filename>`).
fn parse_checksum_body(url: &str, body: &str) -> Result<String> {
    let token = body
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::manifest_parse(url, "empty checksum document"))?;
    if token.len() != 64 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::manifest_parse(
            url,
            format!("'{token}' is not a hex sha-256 digest"),
        ));
    }
    Ok(token.to_ascii_lowercase())
}
