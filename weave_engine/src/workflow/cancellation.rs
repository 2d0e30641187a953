//! Cooperative cancellation tokens for workflows.
//!
//! Every started workflow owns a [`CancellationTokenSource`]. Executors receive
//! a [`CancellationToken`] through their [`TaskContext`](crate::workflow::registry::TaskContext)
//! and may stop early once it fires. The engine never waits for them to do so.
//!
//! # Patterns
//!
//! Polling in a loop:
//!
//! ```ignore
//! while !token.is_cancelled() {
//!     do_chunk().await;
//! }
//! ```
//!
//! Racing work against cancellation:
//!
//! ```ignore
//! tokio::select! {
//!     _ = token.cancelled() => Err(TaskError::Execution("cancelled".into())),
//!     result = do_work() => result,
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Thread-safe cancellation token.
///
/// Cloning a token creates a new reference to the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Returns true if the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until the token is cancelled.
    ///
    /// Returns immediately if cancellation already happened.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Owner of a token that can trigger cancellation.
///
/// # Example
///
/// ```ignore
/// let source = CancellationTokenSource::new();
/// let token = source.token();
///
/// source.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    /// Creates a new source with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the token and wakes every waiter. Idempotent.
    pub fn cancel(&self) {
        self.token.state.cancelled.store(true, Ordering::SeqCst);
        self.token.state.notify.notify_waiters();
    }

    /// Returns true if [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
