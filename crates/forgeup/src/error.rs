//! Error types for the installation pipeline.

use thiserror::Error;

/// Result type for installation pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, fetching, or installing a toolchain.
#[derive(Error, Debug)]
pub enum Error {
    /// The running host could not be mapped to a known target triple.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Fetching the release manifest failed.
    #[error("Failed to fetch manifest from '{url}': {detail}")]
    ManifestFetch {
        /// The manifest URL.
        url: String,
        /// HTTP status code, when the server responded.
        status: Option<u16>,
        /// Failure detail (status line or transport error).
        detail: String,
    },

    /// The manifest document could not be parsed.
    #[error("Malformed manifest from '{url}': {message}")]
    ManifestParse {
        /// The manifest URL.
        url: String,
        /// Parse failure detail.
        message: String,
    },

    /// The manifest has no artifact for the resolved triple.
    #[error("No artifact for triple '{triple}' in channel '{channel}' version '{version}'")]
    TripleNotFound {
        /// The resolved target triple.
        triple: String,
        /// The requested channel.
        channel: String,
        /// The requested version.
        version: String,
    },

    /// Downloading the artifact failed.
    #[error("Failed to download '{url}': {detail}")]
    Download {
        /// The artifact URL.
        url: String,
        /// HTTP status code, when the server responded.
        status: Option<u16>,
        /// Failure detail (status line or transport error).
        detail: String,
    },

    /// Downloaded bytes do not match the manifest-declared hash.
    #[error("Integrity check failed: expected sha256 {expected}, got {actual}")]
    Integrity {
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// Archive format is not one the extractor supports.
    #[error("Unsupported archive format: {0}")]
    UnsupportedArchiveFormat(String),

    /// Unpacking the archive failed.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Published tree does not have the expected shape.
    #[error("Unexpected toolchain layout: {0}")]
    Layout(String),

    /// Lock acquisition timed out.
    #[error("Timed out acquiring install lock for '{key}' after {timeout_secs}s")]
    LockTimeout {
        /// The cache key the lock serializes.
        key: String,
        /// The configured acquisition timeout.
        timeout_secs: u64,
    },

    /// Lock file could not be created or read.
    #[error("Install lock error for '{key}': {source}")]
    LockFile {
        /// The cache key the lock serializes.
        key: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled by the caller.
    #[error("Installation cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an unsupported platform error.
    #[must_use]
    pub fn unsupported_platform(detail: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(detail.into())
    }

    /// Create a manifest fetch error from an HTTP status.
    #[must_use]
    pub fn manifest_status(url: impl Into<String>, status: u16) -> Self {
        Self::ManifestFetch {
            url: url.into(),
            status: Some(status),
            detail: format!("HTTP {status}"),
        }
    }

    /// Create a manifest fetch error from a transport failure.
    #[must_use]
    pub fn manifest_transport(url: impl Into<String>, source: &reqwest::Error) -> Self {
        Self::ManifestFetch {
            url: url.into(),
            status: None,
            detail: source.to_string(),
        }
    }

    /// Create a manifest parse error.
    #[must_use]
    pub fn manifest_parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ManifestParse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a triple not found error.
    #[must_use]
    pub fn triple_not_found(
        triple: impl Into<String>,
        channel: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::TripleNotFound {
            triple: triple.into(),
            channel: channel.into(),
            version: version.into(),
        }
    }

    /// Create a download error from an HTTP status.
    #[must_use]
    pub fn download_status(url: impl Into<String>, status: u16) -> Self {
        Self::Download {
            url: url.into(),
            status: Some(status),
            detail: format!("HTTP {status}"),
        }
    }

    /// Create a download error from a transport failure.
    #[must_use]
    pub fn download_transport(url: impl Into<String>, source: &reqwest::Error) -> Self {
        Self::Download {
            url: url.into(),
            status: None,
            detail: source.to_string(),
        }
    }

    /// Create an integrity error.
    #[must_use]
    pub fn integrity(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Integrity {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an extraction error.
    #[must_use]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    /// Create a layout error.
    #[must_use]
    pub fn layout(message: impl Into<String>) -> Self {
        Self::Layout(message.into())
    }

    /// Create a lock timeout error.
    #[must_use]
    pub fn lock_timeout(key: impl Into<String>, timeout_secs: u64) -> Self {
        Self::LockTimeout {
            key: key.into(),
            timeout_secs,
        }
    }

    /// Create a lock file error.
    #[must_use]
    pub fn lock_file(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::LockFile {
            key: key.into(),
            source,
        }
    }

    /// Whether a fresh attempt could plausibly succeed without operator action.
    ///
    /// Server-side (5xx) responses and transport-level failures (connection
    /// reset, timeout, interrupted body) are worth retrying. Client errors
    /// (4xx), integrity mismatches, and everything filesystem-side are
    /// permanent for the current invocation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ManifestFetch { status, .. } | Self::Download { status, .. } => {
                status.is_none_or(|code| code >= 500)
            }
            _ => false,
        }
    }
}
