//! Toolchain acquisition for forge.
//!
//! This crate provides the full install pipeline:
//! - Detect the host platform as a target triple
//! - Resolve a channel/version to a concrete artifact via release
//!   manifests, or direct URL templates for pinned versions
//! - Download with retry, resume, and sha-256 verification
//! - Extract into a staging directory and publish atomically into a
//!   shared, cross-process-safe cache
//! - Describe how to activate the installed toolchain (bin directory
//!   plus environment overrides)
//!
//! # Example
//!
//! ```ignore
//! use forgeup::{Installer, InstallerConfig};
//!
//! let installer = Installer::new(InstallerConfig::default());
//! let descriptor = installer.install("stable", "latest", None).await?;
//! println!("binaries at {}", descriptor.bin_dir.display());
//! ```

#![warn(missing_docs)]

mod activate;
mod cache;
mod config;
mod download;
mod error;
mod extract;
mod install;
mod lock;
mod manifest;
mod platform;
mod progress;
mod retry;

pub use activate::{ActivationDescriptor, HOME_ENV_VAR};
pub use cache::{CacheKey, InstallReceipt, RECEIPT_FILE, RECEIPT_SCHEMA_VERSION, ToolchainCache};
pub use config::{DistConfig, InstallerConfig, RetryConfig};
pub use download::Downloader;
pub use error::{Error, Result};
pub use extract::{ArchiveFormat, extract};
pub use install::Installer;
pub use lock::{DEFAULT_LOCK_TIMEOUT, InstallLock, LockGuard, LockMetadata, STALE_LOCK_THRESHOLD};
pub use manifest::{
    LATEST, MANIFEST_SCHEMA_VERSION, ManifestArtifact, ManifestResolver, ResolvedArtifact,
    ToolchainManifest,
};
pub use platform::{Abi, Arch, HostTriple, KNOWN_TRIPLES, Os};
pub use progress::{Progress, ProgressFn};
