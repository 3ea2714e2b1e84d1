//! Signal handling for graceful cancellation.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Install signal handlers that cancel the returned token.
///
/// The installer checks the token at its blocking boundaries, so a
/// signal stops the pipeline at the next boundary and lets cleanup
/// (partial-file removal, lock release) run instead of killing the
/// process mid-write.
pub fn install_signal_handlers() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, cancelling install");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, cancelling install");
                }
            }
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows;

            let mut ctrl_c = windows::ctrl_c().expect("Failed to install Ctrl+C handler");
            let mut ctrl_break = windows::ctrl_break().expect("Failed to install Ctrl+Break handler");

            tokio::select! {
                _ = ctrl_c.recv() => {
                    info!("Received Ctrl+C, cancelling install");
                }
                _ = ctrl_break.recv() => {
                    info!("Received Ctrl+Break, cancelling install");
                }
            }
        }

        handler_token.cancel();
    });

    token
}
