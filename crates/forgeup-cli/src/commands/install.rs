//! `forgeup install`: run the acquisition pipeline and emit activation
//! JSON.

use std::path::Path;

use forgeup::{Installer, InstallerConfig, LATEST};
use miette::{IntoDiagnostic, WrapErr};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cli::InstallArgs;
use crate::commands::info_document;
use crate::errors::CliError;
use crate::progress::DownloadBar;

#[instrument(name = "install", skip(cancel))]
pub async fn run(args: InstallArgs, cancel: CancellationToken) -> miette::Result<()> {
    let config = InstallerConfig {
        channel: args.channel.clone(),
        version: (args.version != LATEST).then(|| args.version.clone()),
        triple: args.triple.clone(),
        cache_root: args.cache_dir.clone(),
        ..InstallerConfig::default()
    };
    debug!(channel = %args.channel, version = %args.version, "Starting install");

    let mut installer = Installer::new(config).with_cancellation(cancel);
    let bar = (!args.quiet).then(DownloadBar::new);
    if let Some(bar) = &bar {
        installer = installer.with_progress(bar.progress());
    }

    let result = installer.install_configured().await;
    if let Some(bar) = &bar {
        bar.finish();
    }
    let descriptor = result.map_err(CliError::from)?;

    write_info(&info_document(&descriptor), args.info_json.as_deref())
}

/// Emit the activation document: stdout by default, a file when
/// `--info-json` was given.
fn write_info(document: &serde_json::Value, path: Option<&Path>) -> miette::Result<()> {
    let body = serde_json::to_string_pretty(document).into_diagnostic()?;
    match path {
        Some(path) => {
            std::fs::write(path, &body)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote activation info to {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}
