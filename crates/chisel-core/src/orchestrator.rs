//! Shutdown orchestration shared by server and client mode.
//!
//! ```text
//!   start task ──(Err)──────────────────────────────▶ fatal
//!        │
//!   Active ──(shutdown context cancelled)──▶ ShutdownRequested
//!                                                  │ spawn close task
//!                           ┌──────────────────────┴──────────────┐
//!                     close returns                         10s elapse
//!                           ▼                                     ▼
//!                 Closed (Graceful)                      Closed (TimedOut)
//! ```

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{ChiselError, Result};
use crate::shutdown::ShutdownContext;
use crate::types::{LifecycleState, Mode, ShutdownOutcome};

/// How long the close phase may take before the supervisor stops waiting.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives one engine from start to close.
pub struct Orchestrator<E: Engine> {
    mode: Mode,
    engine: Arc<E>,
    shutdown: ShutdownContext,
    state_tx: watch::Sender<LifecycleState>,
}

impl<E: Engine> Orchestrator<E> {
    /// Creates an orchestrator for a constructed engine.
    ///
    /// The orchestrator starts in [`LifecycleState::Active`].
    #[must_use]
    pub fn new(mode: Mode, engine: E, shutdown: ShutdownContext) -> Self {
        Self::from_shared(mode, Arc::new(engine), shutdown)
    }

    /// Creates an orchestrator for an engine the caller keeps a handle to.
    #[must_use]
    pub fn from_shared(mode: Mode, engine: Arc<E>, shutdown: ShutdownContext) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Active);
        Self {
            mode,
            engine,
            shutdown,
            state_tx,
        }
    }

    /// Subscribes to lifecycle state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn current_state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    fn transition(&self, state: LifecycleState) {
        debug!(mode = %self.mode, ?state, "lifecycle transition");
        self.state_tx.send_replace(state);
    }

    /// Starts the engine, waits for shutdown, then closes it.
    ///
    /// Returns the close outcome. A close error is logged and still counts as
    /// [`ShutdownOutcome::Graceful`], since the close call did return.
    ///
    /// # Errors
    /// Returns [`ChiselError::EngineStart`] as soon as the start task fails,
    /// in any phase.
    pub async fn run(self) -> Result<ShutdownOutcome> {
        let engine = Arc::clone(&self.engine);
        let start_task = tokio::spawn(async move { engine.start().await });
        let start_failure = start_failure(start_task);
        tokio::pin!(start_failure);

        tokio::select! {
            () = self.shutdown.cancelled() => {}
            err = &mut start_failure => return Err(err),
        }

        self.transition(LifecycleState::ShutdownRequested);
        info!(mode = %self.mode, "{} shutting down", self.mode.title());

        let engine = Arc::clone(&self.engine);
        let mode = self.mode;
        let close_task = tokio::spawn(async move {
            if let Err(err) = engine.close().await {
                warn!(mode = %mode, error = %err, "Error closing {mode}");
            }
        });

        let outcome = tokio::select! {
            joined = close_task => {
                if let Err(err) = joined {
                    warn!(mode = %self.mode, error = %err, "Error closing {}", self.mode);
                }
                info!(mode = %self.mode, "{} closed gracefully", self.mode.title());
                ShutdownOutcome::Graceful
            }
            () = tokio::time::sleep(CLOSE_TIMEOUT) => {
                warn!(
                    mode = %self.mode,
                    timeout = ?CLOSE_TIMEOUT,
                    "Timeout waiting for {} to close",
                    self.mode
                );
                ShutdownOutcome::TimedOut
            }
            err = &mut start_failure => return Err(err),
        };

        self.transition(LifecycleState::Closed);
        Ok(outcome)
    }
}

/// Resolves with the start task's error. A start that returns `Ok` leaves the
/// engine idle; the future then never resolves and the supervisor keeps
/// waiting for a signal.
async fn start_failure(task: JoinHandle<Result<()>>) -> ChiselError {
    match task.await {
        Ok(Err(err)) => ChiselError::engine_start(err.to_string()),
        Err(join) => ChiselError::engine_start(format!("start task aborted: {join}")),
        Ok(Ok(())) => {
            debug!("engine start returned without error");
            pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mocks::MockEngine;

    #[tokio::test]
    async fn test_initial_state_active() {
        let orchestrator =
            Orchestrator::new(Mode::Server, MockEngine::new("srv"), ShutdownContext::new());
        assert_eq!(orchestrator.current_state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_graceful_close() {
        let engine = Arc::new(MockEngine::new("srv"));
        let shutdown = ShutdownContext::new();
        let orchestrator = Orchestrator::from_shared(Mode::Server, Arc::clone(&engine), shutdown.clone());
        let mut state = orchestrator.state();

        let run = tokio::spawn(orchestrator.run());
        shutdown.trigger();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert_eq!(*state.borrow_and_update(), LifecycleState::Closed);
        assert_eq!(engine.close_count(), 1);
    }

    #[tokio::test]
    async fn test_start_error_is_fatal() {
        let engine = MockEngine::new("srv").fail_start("address already in use");
        let orchestrator = Orchestrator::new(Mode::Server, engine, ShutdownContext::new());

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, ChiselError::EngineStart(_)));
        assert!(err.to_string().contains("address already in use"));
    }

    #[tokio::test]
    async fn test_close_error_does_not_fail_run() {
        let engine = MockEngine::new("cli").fail_close("socket already closed");
        let shutdown = ShutdownContext::new();
        shutdown.trigger();

        let outcome = Orchestrator::new(Mode::Client, engine, shutdown)
            .run()
            .await
            .unwrap();
        assert_eq!(outcome, ShutdownOutcome::Graceful);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_timeout() {
        let engine = Arc::new(MockEngine::new("srv").close_delay(Duration::from_secs(60)));
        let shutdown = ShutdownContext::new();
        shutdown.trigger();

        let outcome = Orchestrator::from_shared(Mode::Server, Arc::clone(&engine), shutdown)
            .run()
            .await
            .unwrap();
        assert_eq!(outcome, ShutdownOutcome::TimedOut);
        assert_eq!(engine.close_count(), 1);
    }
}
