//! Termination signal sources and the interrupt handler task.
//!
//! The handler is the only writer of the [`ShutdownContext`]. Sources are
//! injectable so tests can deliver synthetic signals.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ChiselError, Result};
use crate::shutdown::ShutdownContext;
use crate::types::Signal;

/// A stream of termination signals.
#[async_trait]
pub trait SignalSource: Send + 'static {
    /// Waits for the next signal. `None` means no more signals will arrive.
    async fn recv(&mut self) -> Option<Signal>;
}

/// SIGINT and SIGTERM delivered by the operating system.
#[cfg(unix)]
pub struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    /// Registers handlers for SIGINT and SIGTERM.
    ///
    /// Once registered, the default disposition (process exit) no longer
    /// applies to either signal for the rest of the process lifetime.
    ///
    /// # Errors
    /// Returns an error if a handler cannot be installed.
    pub fn register() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let interrupt = signal(SignalKind::interrupt())
            .map_err(|e| ChiselError::Signal(format!("failed to register SIGINT handler: {e}")))?;
        let terminate = signal(SignalKind::terminate())
            .map_err(|e| ChiselError::Signal(format!("failed to register SIGTERM handler: {e}")))?;
        Ok(Self {
            interrupt,
            terminate,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            sig = self.interrupt.recv() => sig.map(|()| Signal::Int),
            sig = self.terminate.recv() => sig.map(|()| Signal::Term),
        }
    }
}

/// Ctrl+C delivered by the console.
#[cfg(not(unix))]
pub struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    /// Returns the console interrupt source.
    ///
    /// # Errors
    /// Never fails on this platform; registration happens on first receive.
    pub fn register() -> Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::signal::ctrl_c().await.ok().map(|()| Signal::Int)
    }
}

/// Channel-backed signal source for tests and embedding.
#[derive(Debug)]
pub struct ChannelSignals {
    rx: mpsc::Receiver<Signal>,
}

impl ChannelSignals {
    /// Creates a source and the handle that feeds it.
    #[must_use]
    pub fn new() -> (Self, SignalHandle) {
        let (tx, rx) = mpsc::channel(16);
        (Self { rx }, SignalHandle { tx })
    }
}

#[async_trait]
impl SignalSource for ChannelSignals {
    async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

/// Handle for delivering signals to a [`ChannelSignals`] source.
#[derive(Clone, Debug)]
pub struct SignalHandle {
    tx: mpsc::Sender<Signal>,
}

impl SignalHandle {
    /// Delivers a signal.
    ///
    /// # Errors
    /// Returns an error if the source has been dropped.
    pub async fn send_signal(&self, signal: Signal) -> Result<()> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| ChiselError::Signal("signal source closed".to_string()))
    }

    /// Delivers SIGINT.
    ///
    /// # Errors
    /// Returns an error if the source has been dropped.
    pub async fn interrupt(&self) -> Result<()> {
        self.send_signal(Signal::Int).await
    }
}

/// Spawns the task that turns signals into a shutdown request.
///
/// The first signal cancels `shutdown`; later ones are absorbed so a second
/// Ctrl+C does not kill the process mid-close. The task ends when the source
/// is exhausted.
pub fn spawn_interrupt_handler<S: SignalSource>(
    mut source: S,
    shutdown: ShutdownContext,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = source.recv().await {
            if shutdown.trigger() {
                info!(
                    signal = ?signal,
                    "Received termination signal, initiating graceful shutdown"
                );
            } else {
                debug!(signal = ?signal, "Shutdown already requested, ignoring signal");
            }
        }
    })
}
