//! Error rendering for the CLI.
//!
//! Wraps library failures with a diagnostic code and a next-step hint
//! per failure class, so a failed install reads as an actionable
//! message instead of a bare cause chain.

use forgeup::Error;
use miette::Diagnostic;
use thiserror::Error as ThisError;

/// Library failures grouped by what the user can do about them.
#[derive(Debug, ThisError, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(
        code(forgeup::cli::platform),
        help("Pass --triple with one of the distribution's released targets")
    )]
    Platform(Error),

    #[error(transparent)]
    #[diagnostic(
        code(forgeup::cli::resolve),
        help("Check the channel and version spelling, and that the dist server is reachable")
    )]
    Resolve(Error),

    #[error(transparent)]
    #[diagnostic(
        code(forgeup::cli::download),
        help("Re-run the install; interrupted downloads are picked up or restarted cleanly")
    )]
    Download(Error),

    #[error(transparent)]
    #[diagnostic(
        code(forgeup::cli::install),
        help("Check free space and permissions on the cache directory")
    )]
    Install(Error),

    #[error(transparent)]
    #[diagnostic(
        code(forgeup::cli::locked),
        help("Another forgeup process is installing the same toolchain; re-run once it finishes")
    )]
    Locked(Error),

    #[error(transparent)]
    #[diagnostic(code(forgeup::cli::interrupted))]
    Interrupted(Error),

    #[error("no installed toolchain matches {spec}")]
    #[diagnostic(
        code(forgeup::cli::not_installed),
        help("Run `forgeup install` to download it first")
    )]
    NotInstalled { spec: String },
}

impl CliError {
    /// `forgeup env` found nothing to activate.
    pub fn not_installed(spec: impl Into<String>) -> Self {
        Self::NotInstalled { spec: spec.into() }
    }
}

impl From<Error> for CliError {
    fn from(error: Error) -> Self {
        match &error {
            Error::UnsupportedPlatform(_) => Self::Platform(error),
            Error::ManifestFetch { .. } | Error::ManifestParse { .. } | Error::TripleNotFound { .. } => {
                Self::Resolve(error)
            }
            Error::Download { .. } | Error::Integrity { .. } => Self::Download(error),
            Error::LockTimeout { .. } | Error::LockFile { .. } => Self::Locked(error),
            Error::Cancelled => Self::Interrupted(error),
            _ => Self::Install(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_errors_suggest_a_triple() {
        let wrapped = CliError::from(Error::unsupported_platform("no artifact for 'sparc64'"));
        assert!(matches!(wrapped, CliError::Platform(_)));
        assert!(wrapped.to_string().contains("sparc64"));
        assert!(wrapped.help().unwrap().to_string().contains("--triple"));
    }

    #[test]
    fn test_resolution_and_download_classes() {
        let wrapped = CliError::from(Error::triple_not_found(
            "aarch64-apple-darwin",
            "stable",
            "1.2.0",
        ));
        assert!(matches!(wrapped, CliError::Resolve(_)));

        let wrapped = CliError::from(Error::integrity("aa".repeat(32), "bb".repeat(32)));
        assert!(matches!(wrapped, CliError::Download(_)));
    }

    #[test]
    fn test_lock_timeout_is_reported_as_contention() {
        let wrapped = CliError::from(Error::lock_timeout("stable-1.2.0", 300));
        assert!(matches!(wrapped, CliError::Locked(_)));
        assert!(wrapped.help().unwrap().to_string().contains("Another"));
    }

    #[test]
    fn test_cancellation_has_no_help_text() {
        let wrapped = CliError::from(Error::Cancelled);
        assert!(matches!(wrapped, CliError::Interrupted(_)));
        assert!(wrapped.help().is_none());
    }

    #[test]
    fn test_not_installed_names_the_request() {
        let err = CliError::not_installed("stable 1.2.0 (x86_64-unknown-linux-gnu)");
        assert!(err.to_string().contains("stable 1.2.0"));
        assert!(err.help().unwrap().to_string().contains("forgeup install"));
    }
}
