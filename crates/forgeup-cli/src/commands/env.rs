//! `forgeup env`: activation JSON for an already-installed toolchain.
//!
//! Answers purely from receipts in the cache, so it is safe to call
//! from shell init scripts with no network access.

use forgeup::{ActivationDescriptor, CacheKey, HostTriple, ToolchainCache};
use miette::IntoDiagnostic;
use tracing::instrument;

use crate::cli::EnvArgs;
use crate::commands::info_document;
use crate::errors::CliError;

#[instrument(name = "env")]
pub fn run(args: &EnvArgs) -> miette::Result<()> {
    let triple = HostTriple::resolve(args.triple.as_deref()).map_err(CliError::from)?;
    let cache = args
        .cache_dir
        .clone()
        .map_or_else(ToolchainCache::default, ToolchainCache::new);

    let key = select_entry(
        &cache,
        &args.channel,
        args.version.as_deref(),
        &triple.to_string(),
    )?;
    let descriptor =
        ActivationDescriptor::for_toolchain(&cache.toolchain_dir(&key)).map_err(CliError::from)?;

    let body = serde_json::to_string_pretty(&info_document(&descriptor)).into_diagnostic()?;
    println!("{body}");
    Ok(())
}

/// Pick the entry to activate: the pinned version when given, otherwise
/// the channel's most recently installed one.
fn select_entry(
    cache: &ToolchainCache,
    channel: &str,
    version: Option<&str>,
    triple: &str,
) -> Result<CacheKey, CliError> {
    if let Some(version) = version {
        let key = CacheKey::new(channel, version, triple);
        if cache.is_published(&key) {
            return Ok(key);
        }
        return Err(CliError::not_installed(format!(
            "{channel} {version} ({triple})"
        )));
    }

    cache
        .receipts()
        .map_err(CliError::from)?
        .into_iter()
        .find(|receipt| receipt.channel == channel && receipt.triple == triple)
        .map(|receipt| CacheKey::new(receipt.channel, receipt.version, receipt.triple))
        .ok_or_else(|| CliError::not_installed(format!("{channel} ({triple})")))
}
