//! Progress reporting boundary.
//!
//! Consumers (a CLI progress bar, a build backend's status line) inject a
//! callback; the pipeline reports byte counts through it. The callback is
//! an observer only: a panicking callback is contained and logged, never
//! allowed to abort an in-flight download.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Callback receiving `(bytes_so_far, total_bytes_if_known)` events.
///
/// Byte counts are monotonically increasing within one download attempt.
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Cloneable handle over an optional progress callback.
#[derive(Clone, Default)]
pub struct Progress {
    callback: Option<Arc<ProgressFn>>,
}

impl Progress {
    /// A handle that reports nowhere.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Wrap a callback.
    pub fn new(callback: impl Fn(u64, Option<u64>) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Report a progress event. Callback panics are swallowed.
    pub(crate) fn report(&self, bytes: u64, total: Option<u64>) {
        if let Some(callback) = &self.callback {
            let result = catch_unwind(AssertUnwindSafe(|| callback(bytes, total)));
            if result.is_err() {
                tracing::warn!(bytes, "Progress callback panicked; continuing download");
            }
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}
