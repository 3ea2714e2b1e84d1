//! Activation descriptors for installed toolchains.
//!
//! Installation ends with a published directory on disk; activation is
//! how a caller actually uses it. The descriptor names the executable
//! directory and the environment overrides (a `PATH` prepend and
//! `FORGEUP_HOME`) that make the toolchain's binaries resolvable, without
//! mutating the current process.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable pointing at the active toolchain directory.
pub const HOME_ENV_VAR: &str = "FORGEUP_HOME";

/// How to activate one installed toolchain.
///
/// Serializes to JSON for consumers that splice the environment into
/// their own process management, mirroring what [`Self::apply_to`] does
/// for [`std::process::Command`].
#[derive(Debug, Clone, Serialize)]
pub struct ActivationDescriptor {
    /// The published toolchain directory.
    pub toolchain_dir: PathBuf,
    /// Directory containing the toolchain's executables.
    pub bin_dir: PathBuf,
    /// Environment overrides to apply when running toolchain binaries.
    pub env: BTreeMap<String, String>,
}

impl ActivationDescriptor {
    /// Build a descriptor for the toolchain published at `toolchain_dir`.
    ///
    /// The executable directory is `bin/` directly under the toolchain
    /// root, or `bin/` inside a single wrapping directory, which is how
    /// release archives that nest their payload under
    /// `forge-<version>-<triple>/` unpack.
    ///
    /// # Errors
    /// [`Error::Layout`] when no executable directory can be found or the
    /// environment overrides cannot be rendered.
    pub fn for_toolchain(toolchain_dir: &Path) -> Result<Self> {
        let bin_dir = find_bin_dir(toolchain_dir)?;
        let env = build_env(&bin_dir, toolchain_dir, env::var_os("PATH"))?;
        debug!(
            toolchain_dir = %toolchain_dir.display(),
            bin_dir = %bin_dir.display(),
            "Built activation descriptor"
        );
        Ok(Self {
            toolchain_dir: toolchain_dir.to_path_buf(),
            bin_dir,
            env,
        })
    }

    /// Apply the environment overrides to a command.
    pub fn apply_to(&self, command: &mut std::process::Command) {
        for (name, value) in &self.env {
            command.env(name, value);
        }
    }
}

/// Locate the executable directory under a published toolchain.
fn find_bin_dir(toolchain_dir: &Path) -> Result<PathBuf> {
    let direct = toolchain_dir.join("bin");
    if direct.is_dir() {
        return Ok(direct);
    }

    // Archives often wrap everything in one top-level directory.
    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(toolchain_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        }
    }
    if let [only] = subdirs.as_slice() {
        let nested = only.join("bin");
        if nested.is_dir() {
            return Ok(nested);
        }
    }

    Err(Error::layout(format!(
        "no bin directory found under {}",
        toolchain_dir.display()
    )))
}

/// Compute the environment overrides for a toolchain.
fn build_env(
    bin_dir: &Path,
    toolchain_dir: &Path,
    existing_path: Option<OsString>,
) -> Result<BTreeMap<String, String>> {
    let mut paths = vec![bin_dir.to_path_buf()];
    if let Some(existing) = &existing_path {
        paths.extend(env::split_paths(existing));
    }
    let joined = env::join_paths(paths)
        .map_err(|e| Error::layout(format!("cannot prepend {} to PATH: {e}", bin_dir.display())))?;
    let path = joined
        .into_string()
        .map_err(|_| Error::layout("PATH contains non-unicode entries"))?;

    let mut env = BTreeMap::new();
    env.insert(HOME_ENV_VAR.to_string(), toolchain_dir.display().to_string());
    env.insert("PATH".to_string(), path);
    Ok(env)
}
