//! Supervisor test harness.
//!
//! Wires a [`ScriptedEngine`] (or any engine) to the same pieces the binary
//! uses: a [`ShutdownContext`], an interrupt handler and an [`Orchestrator`].
//! Signals come from a [`ChannelSignals`] source so tests can deliver them at
//! any point, including before the engine has been constructed.

use std::time::Duration;

use chisel_core::{
    ChannelSignals, Engine, LifecycleState, Mode, Orchestrator, ShutdownContext,
    ShutdownOutcome, Signal, SignalHandle, spawn_interrupt_handler,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, TestError};

/// Default bound on how long [`RunningSupervisor::finish`] waits.
const FINISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for one supervised run.
pub struct SupervisorHarness<E: Engine> {
    mode: Mode,
    engine: E,
    construct_delay: Duration,
}

impl<E: Engine> SupervisorHarness<E> {
    /// Supervises `engine` in server mode.
    #[must_use]
    pub fn server(engine: E) -> Self {
        Self::new(Mode::Server, engine)
    }

    /// Supervises `engine` in client mode.
    #[must_use]
    pub fn client(engine: E) -> Self {
        Self::new(Mode::Client, engine)
    }

    /// Supervises `engine` in the given mode.
    #[must_use]
    pub fn new(mode: Mode, engine: E) -> Self {
        Self {
            mode,
            engine,
            construct_delay: Duration::ZERO,
        }
    }

    /// Delays handing the engine to the orchestrator, as a slow constructor
    /// would. The signal handler is already live during the delay.
    #[must_use]
    pub const fn with_construct_delay(mut self, delay: Duration) -> Self {
        self.construct_delay = delay;
        self
    }

    /// Starts the run.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn launch(self) -> RunningSupervisor {
        let shutdown = ShutdownContext::new();
        let (source, signals) = ChannelSignals::new();
        let handler = spawn_interrupt_handler(source, shutdown.clone());

        let (state_tx, state_rx) = watch::channel(None);
        let mode = self.mode;
        let context = shutdown.clone();
        let run = tokio::spawn(async move {
            if !self.construct_delay.is_zero() {
                tokio::time::sleep(self.construct_delay).await;
            }
            debug!(%mode, engine = self.engine.name(), "engine constructed");

            let orchestrator = Orchestrator::new(mode, self.engine, context);
            let mut states = orchestrator.state();
            state_tx.send_replace(Some(*states.borrow_and_update()));
            tokio::spawn(async move {
                while states.changed().await.is_ok() {
                    let state = *states.borrow_and_update();
                    state_tx.send_replace(Some(state));
                }
            });

            orchestrator.run().await
        });

        RunningSupervisor {
            shutdown,
            signals,
            state: state_rx,
            run,
            handler,
        }
    }
}

/// A run in progress.
pub struct RunningSupervisor {
    shutdown: ShutdownContext,
    signals: SignalHandle,
    state: watch::Receiver<Option<LifecycleState>>,
    run: JoinHandle<chisel_core::Result<ShutdownOutcome>>,
    handler: JoinHandle<()>,
}

impl RunningSupervisor {
    /// Delivers SIGINT.
    ///
    /// # Errors
    /// Returns an error if the interrupt handler has exited.
    pub async fn interrupt(&self) -> Result<()> {
        self.signal(Signal::Int).await
    }

    /// Delivers SIGTERM.
    ///
    /// # Errors
    /// Returns an error if the interrupt handler has exited.
    pub async fn terminate(&self) -> Result<()> {
        self.signal(Signal::Term).await
    }

    /// Delivers a signal.
    ///
    /// # Errors
    /// Returns an error if the interrupt handler has exited.
    pub async fn signal(&self, signal: Signal) -> Result<()> {
        Ok(self.signals.send_signal(signal).await?)
    }

    /// Returns the shutdown context shared with the handler.
    #[must_use]
    pub fn shutdown(&self) -> &ShutdownContext {
        &self.shutdown
    }

    /// Returns the lifecycle state, or `None` while the engine is still being
    /// constructed.
    #[must_use]
    pub fn state(&self) -> Option<LifecycleState> {
        *self.state.borrow()
    }

    /// Waits until the orchestrator reaches `target`.
    ///
    /// # Errors
    /// Returns [`TestError::Timeout`] if `target` is not reached in time.
    pub async fn wait_for(&mut self, target: LifecycleState, timeout: Duration) -> Result<()> {
        let reached = self.state.wait_for(|state| *state == Some(target));
        match tokio::time::timeout(timeout, reached).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TestError::harness(format!(
                "run ended before reaching {target:?}"
            ))),
            Err(_) => Err(TestError::Timeout(timeout)),
        }
    }

    /// Waits for the run to end and returns its outcome.
    ///
    /// # Errors
    /// Returns the orchestrator's error, or [`TestError::Timeout`].
    pub async fn finish(self) -> Result<ShutdownOutcome> {
        self.finish_within(FINISH_TIMEOUT).await
    }

    /// Like [`finish`](Self::finish) with a custom bound.
    ///
    /// # Errors
    /// Returns the orchestrator's error, or [`TestError::Timeout`].
    pub async fn finish_within(self, timeout: Duration) -> Result<ShutdownOutcome> {
        let joined = tokio::time::timeout(timeout, self.run)
            .await
            .map_err(|_| TestError::Timeout(timeout))?;
        self.handler.abort();
        let outcome = joined.map_err(|e| TestError::harness(format!("run task failed: {e}")))?;
        Ok(outcome?)
    }
}
