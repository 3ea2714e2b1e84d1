use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::{LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "forgeup")]
#[command(about = "Installer for forge toolchain distributions")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "pretty",
        value_enum
    )]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Download and install a toolchain")]
    Install(InstallArgs),
    #[command(about = "Print activation JSON for an installed toolchain")]
    Env(EnvArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Release channel to install from
    #[arg(long, default_value = "stable")]
    pub channel: String,

    /// Version to install; "latest" follows the channel head
    #[arg(long, default_value = "latest")]
    pub version: String,

    /// Target triple override; detected from the host when omitted
    #[arg(long)]
    pub triple: Option<String>,

    /// Cache directory override
    #[arg(long, env = "FORGEUP_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Write activation JSON to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub info_json: Option<PathBuf>,

    /// Suppress the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Release channel of the installed toolchain
    #[arg(long, default_value = "stable")]
    pub channel: String,

    /// Installed version; the most recently installed one when omitted
    #[arg(long)]
    pub version: Option<String>,

    /// Target triple override; detected from the host when omitted
    #[arg(long)]
    pub triple: Option<String>,

    /// Cache directory override
    #[arg(long, env = "FORGEUP_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["forgeup", "install"]).unwrap();

        assert!(matches!(cli.level, LogLevel::Warn));
        assert!(matches!(cli.log_format, LogFormat::Pretty));
        let Commands::Install(args) = cli.command else {
            panic!("Expected Install command");
        };
        assert_eq!(args.channel, "stable");
        assert_eq!(args.version, "latest");
        assert!(args.triple.is_none());
        assert!(args.cache_dir.is_none());
        assert!(args.info_json.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_log_level_parsing() {
        let cli = Cli::try_parse_from(["forgeup", "--level", "trace", "install"]).unwrap();
        assert!(matches!(cli.level, LogLevel::Trace));

        let cli = Cli::try_parse_from(["forgeup", "--level", "debug", "install"]).unwrap();
        assert!(matches!(cli.level, LogLevel::Debug));

        let cli = Cli::try_parse_from(["forgeup", "--level", "info", "install"]).unwrap();
        assert!(matches!(cli.level, LogLevel::Info));

        let cli = Cli::try_parse_from(["forgeup", "--level", "error", "install"]).unwrap();
        assert!(matches!(cli.level, LogLevel::Error));

        // Short form, and the flag is global so it may follow the subcommand.
        let cli = Cli::try_parse_from(["forgeup", "install", "-l", "debug"]).unwrap();
        assert!(matches!(cli.level, LogLevel::Debug));
    }

    #[test]
    fn test_cli_log_format_parsing() {
        let cli = Cli::try_parse_from(["forgeup", "--log-format", "json", "install"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));

        let cli = Cli::try_parse_from(["forgeup", "--log-format", "compact", "install"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Compact));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = Cli::try_parse_from(["forgeup", "--level", "invalid", "install"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_subcommand() {
        let result = Cli::try_parse_from(["forgeup"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_help_flag() {
        let result = Cli::try_parse_from(["forgeup", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.kind() == clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_install_command_with_options() {
        let cli = Cli::try_parse_from([
            "forgeup",
            "install",
            "--channel",
            "nightly",
            "--version",
            "1.4.0",
            "--triple",
            "aarch64-apple-darwin",
            "--cache-dir",
            "/tmp/fu",
            "--info-json",
            "out.json",
            "--quiet",
        ])
        .unwrap();

        let Commands::Install(args) = cli.command else {
            panic!("Expected Install command");
        };
        assert_eq!(args.channel, "nightly");
        assert_eq!(args.version, "1.4.0");
        assert_eq!(args.triple.as_deref(), Some("aarch64-apple-darwin"));
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/fu")));
        assert_eq!(args.info_json, Some(PathBuf::from("out.json")));
        assert!(args.quiet);
    }

    #[test]
    fn test_env_command_defaults() {
        let cli = Cli::try_parse_from(["forgeup", "env"]).unwrap();

        let Commands::Env(args) = cli.command else {
            panic!("Expected Env command");
        };
        assert_eq!(args.channel, "stable");
        assert!(args.version.is_none());
        assert!(args.triple.is_none());
    }

    #[test]
    fn test_env_command_pinned() {
        let cli = Cli::try_parse_from(["forgeup", "env", "--version", "1.2.0"]).unwrap();

        let Commands::Env(args) = cli.command else {
            panic!("Expected Env command");
        };
        assert_eq!(args.version.as_deref(), Some("1.2.0"));
    }
}
