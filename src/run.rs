//! Supervision of one engine for the lifetime of the process.

use std::path::PathBuf;

use chisel_core::{
    ClientConfig, Engine, Mode, Orchestrator, OsSignals, Result, ServerConfig, ShutdownContext,
    ShutdownOutcome, SignalSource, spawn_interrupt_handler, write_pid_file_in,
};
use chisel_observe::{REPORT_INTERVAL, spawn_stats_reporter};
use chisel_tunnel::{TunnelClient, TunnelServer};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::resolve::Launch;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
/// Calling it again is a no-op.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Side effects performed around the orchestrator.
#[derive(Debug, Clone)]
pub struct Supervision {
    /// Write the PID file once the engine is constructed.
    pub write_pid: bool,
    /// Directory the PID file goes into.
    pub pid_dir: PathBuf,
    /// Start the statistics reporter.
    pub report_stats: bool,
}

impl Default for Supervision {
    fn default() -> Self {
        Self {
            write_pid: false,
            pid_dir: PathBuf::from("."),
            report_stats: true,
        }
    }
}

/// Runs one engine under the shutdown orchestrator.
///
/// The interrupt handler is live before `construct` runs, so a signal
/// received during construction still leads to an orderly close.
///
/// # Errors
/// Returns the constructor's error, a PID-file error, or a start failure.
pub async fn supervise<E, S, F>(
    mode: Mode,
    signals: S,
    construct: F,
    supervision: &Supervision,
) -> Result<ShutdownOutcome>
where
    E: Engine,
    S: SignalSource,
    F: FnOnce() -> Result<E>,
{
    let shutdown = ShutdownContext::new();
    let _handler = spawn_interrupt_handler(signals, shutdown.clone());

    let engine = construct()?;
    debug!(%mode, engine = engine.name(), "engine constructed");

    if supervision.write_pid {
        let path = write_pid_file_in(&supervision.pid_dir)?;
        info!(path = %path.display(), "PID file written");
    }
    if supervision.report_stats {
        spawn_stats_reporter(REPORT_INTERVAL);
    }

    Orchestrator::new(mode, engine, shutdown).run().await
}

fn log_launch<C: Serialize>(mode: Mode, launch: &Launch<C>) {
    for warning in &launch.warnings {
        warn!("{warning}");
    }
    match serde_json::to_string(&launch.config) {
        Ok(json) => debug!(%mode, config = %json, "resolved configuration"),
        Err(e) => debug!(%mode, error = %e, "configuration not serializable"),
    }
}

fn supervision_for<C>(launch: &Launch<C>) -> Supervision {
    Supervision {
        write_pid: launch.write_pid,
        ..Supervision::default()
    }
}

/// Runs the server until a termination signal.
///
/// # Errors
/// Returns configuration, PID-file and start failures.
pub async fn serve(launch: Launch<ServerConfig>) -> Result<ShutdownOutcome> {
    log_launch(Mode::Server, &launch);
    let supervision = supervision_for(&launch);
    let config = launch.config;
    supervise(
        Mode::Server,
        OsSignals::register()?,
        move || TunnelServer::new(config),
        &supervision,
    )
    .await
}

/// Runs the client until a termination signal or until it runs out of
/// retries.
///
/// # Errors
/// Returns configuration, PID-file and start failures.
pub async fn connect(launch: Launch<ClientConfig>) -> Result<ShutdownOutcome> {
    log_launch(Mode::Client, &launch);
    let supervision = supervision_for(&launch);
    let config = launch.config;
    supervise(
        Mode::Client,
        OsSignals::register()?,
        move || TunnelClient::new(config),
        &supervision,
    )
    .await
}
