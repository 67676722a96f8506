//! One-shot shutdown context shared by the signal handler and the orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A cancellation flag that flips from active to cancelled exactly once.
///
/// Clones share the same state. The waiter registers with the notifier
/// before reading the flag, so a trigger racing with [`cancelled`] is never
/// lost.
///
/// [`cancelled`]: ShutdownContext::cancelled
#[derive(Debug, Clone, Default)]
pub struct ShutdownContext {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownContext {
    /// Creates an active context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the context.
    ///
    /// Returns true only for the call that performed the transition; every
    /// later call is a no-op returning false.
    pub fn trigger(&self) -> bool {
        let first = self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Returns true once the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until the context is cancelled. Returns immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
