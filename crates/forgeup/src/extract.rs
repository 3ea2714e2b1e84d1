//! Archive extraction into staging directories.
//!
//! Supports gzip-compressed tar and zip, the two container formats the
//! distribution ships. Extraction always targets a process-private staging
//! directory; entries that would resolve outside it are rejected rather
//! than skipped, and executable mode bits are restored on unix.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;

/// Container format of a distribution artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball (`.tar.gz` / `.tgz`)
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zip archive (`.zip`)
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveFormat {
    /// Parse a manifest format string.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedArchiveFormat`] for anything the
    /// extractor cannot unpack.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "zip" => Ok(Self::Zip),
            other => Err(Error::UnsupportedArchiveFormat(other.to_string())),
        }
    }

    /// Infer the format from an artifact URL or filename.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedArchiveFormat`] when the extension is
    /// not one the extractor understands.
    pub fn from_path(path: &str) -> Result<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            Err(Error::UnsupportedArchiveFormat(path.to_string()))
        }
    }

    /// Canonical manifest spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unpack `archive` into `staging`, dispatching on the declared format.
///
/// The staging directory is created if missing. On error the caller owns
/// cleanup of whatever was partially written; nothing is ever written
/// outside `staging`.
pub fn extract(archive: &Path, format: ArchiveFormat, staging: &Path) -> Result<()> {
    std::fs::create_dir_all(staging)?;
    debug!(archive = %archive.display(), %format, staging = %staging.display(), "Extracting artifact");
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(archive, staging),
        ArchiveFormat::Zip => extract_zip(archive, staging),
    }
}

/// Extract a gzip-compressed tarball.
///
/// `unpack_in` reports entries whose resolved path would escape the
/// destination; those fail the whole extraction.
fn extract_tar_gz(archive_path: &Path, staging: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| Error::extraction(format!("failed to read archive: {e}")))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::extraction(format!("failed to read archive entry: {e}")))?;
        let entry_path = entry
            .path()
            .map_err(|e| Error::extraction(format!("invalid path in archive: {e}")))?
            .into_owned();

        let unpacked = entry
            .unpack_in(staging)
            .map_err(|e| Error::extraction(format!("failed to unpack '{}': {e}", entry_path.display())))?;
        if !unpacked {
            return Err(Error::extraction(format!(
                "entry '{}' escapes the extraction directory",
                entry_path.display()
            )));
        }
    }
    Ok(())
}

/// Extract a zip archive, restoring unix mode bits where recorded.
fn extract_zip(archive_path: &Path, staging: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::extraction(format!("failed to open zip: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::extraction(format!("failed to read zip entry: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::extraction(format!(
                "entry '{}' escapes the extraction directory",
                entry.name()
            )));
        };
        let outpath = staging.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            std::fs::write(&outpath, &content)?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}
