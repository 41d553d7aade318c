//! Cooperative cancellation shared between the signal handler and workers.
//!
//! `CancelToken` wraps an `Arc<AtomicBool>`. Workers check it before they
//! start a host; work already in flight (in particular a commit waiting for
//! confirmation) is never interrupted by it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply-clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new token in the "running" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token tripped by Ctrl-C.
    ///
    /// If a handler is already installed the token is returned unwired and a
    /// debug line is emitted.
    #[must_use]
    pub fn install_ctrlc() -> Self {
        let token = Self::new();
        let handler_token = token.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if !handler_token.is_cancelled() {
                tracing::warn!("interrupt received, finishing in-flight hosts");
            }
            handler_token.cancel();
        }) {
            tracing::debug!("ctrl-c handler not installed: {e}");
        }
        token
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
