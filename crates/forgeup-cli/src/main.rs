//! `forgeup` binary entry point.
//!
//! Activation JSON goes to stdout; logs, progress, and errors go to
//! stderr so the output stays pipeable.

mod cli;
mod commands;
mod errors;
mod logging;
mod progress;
mod shutdown;

use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    if let Err(error) = run_main().await {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.level, cli.log_format)?;

    match cli.command {
        Commands::Install(args) => {
            let cancel = shutdown::install_signal_handlers();
            commands::install::run(args, cancel).await
        }
        Commands::Env(args) => commands::env::run(&args),
    }
}
