//! Start/close bookkeeping shared by both engines.

use std::sync::atomic::{AtomicBool, Ordering};

use chisel_core::ShutdownContext;

/// Tracks whether `start` is running and lets `close` stop it.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    running: AtomicBool,
    closing: ShutdownContext,
    stopped: ShutdownContext,
}

impl RunState {
    /// Marks the engine as running. Returns `None` if close already happened
    /// or start was already entered once.
    ///
    /// `begin` stores `running` then loads `closing`; `close` stores
    /// `closing` then loads `running`. Both sides use `SeqCst` so at least
    /// one of them sees the other's store.
    pub(crate) fn begin(&self) -> Option<RunGuard<'_>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        if self.closing.is_cancelled() {
            self.stopped.trigger();
            return None;
        }
        Some(RunGuard { state: self })
    }

    /// Resolves once close has been requested.
    pub(crate) async fn closing(&self) {
        self.closing.cancelled().await;
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Requests close and waits for a running start to wind down.
    pub(crate) async fn close(&self) {
        self.closing.trigger();
        if self.running.load(Ordering::SeqCst) {
            self.stopped.cancelled().await;
        }
    }
}

/// Marks start as finished when dropped, on every exit path.
pub(crate) struct RunGuard<'a> {
    state: &'a RunState,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.stopped.trigger();
    }
}
