//! Cooperative cancellation for long-running operations.
//!
//! Every operation that shells out to git, touches an issue store, or waits
//! on the AI oracle takes a [`CancelToken`] and calls [`CancelToken::checkpoint`]
//! between steps. Cancellation is cooperative: an in-flight subprocess is not
//! killed, but no further step starts once the token is cancelled.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Returned from [`CancelToken::checkpoint`] when the token was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// A clonable cancellation handle shared between an operation and its caller.
///
/// Cloning is cheap; all clones observe the same flag. A fresh token is
/// never cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Bail out of the current operation if cancellation was requested.
    ///
    /// # Errors
    /// Returns [`Cancelled`] iff the token has been cancelled.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
