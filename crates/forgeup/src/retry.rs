//! Retry logic with exponential backoff for network operations.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry a fallible async operation with exponential backoff.
///
/// Only errors reporting themselves transient ([`Error::is_transient`]) are
/// retried; everything else fails on the spot. On exhaustion the last error
/// is returned unchanged, so the caller sees the taxonomy kind of the final
/// underlying cause. The cancellation token is honored during backoff
/// sleeps.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = create_backoff(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    debug!(
                        operation = operation_name,
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(err);
                }

                if attempts >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        "Operation failed after maximum attempts"
                    );
                    return Err(err);
                }

                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            operation = operation_name,
                            attempts = attempts,
                            error = %err,
                            retry_in_ms = duration.as_millis(),
                            "Operation failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Err(Error::Cancelled),
                            () = tokio::time::sleep(duration) => {}
                        }
                    }
                    // Backoff exhausted
                    None => return Err(err),
                }
            }
        }
    }
}

/// Create exponential backoff from config
fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
        .with_max_interval(Duration::from_millis(config.max_backoff_ms))
        .with_multiplier(config.backoff_multiplier)
        .with_max_elapsed_time(None) // We use max_attempts instead
        .build()
}
