//! Periodic and on-demand self-statistics reporting.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::monitor::{ProcessMonitor, ProcessSnapshot};

/// Interval between routine stats reports.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tick,
    Request,
}

/// Spawns the stats reporter.
///
/// Every `interval` a sample is logged at debug. On unix, SIGUSR2 logs one
/// immediately at info. The task runs until the runtime shuts down.
pub fn spawn_stats_reporter(interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = ProcessMonitor::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut requests = StatsRequests::register();

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => Trigger::Tick,
                () = requests.recv() => Trigger::Request,
            };
            report(&mut monitor, trigger);
        }
    })
}

fn report(monitor: &mut ProcessMonitor, trigger: Trigger) {
    let snapshot = match monitor.collect() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "failed to sample process stats");
            return;
        }
    };
    let tasks = tokio::runtime::Handle::current()
        .metrics()
        .num_alive_tasks();

    match trigger {
        Trigger::Tick => debug!(tasks, "{}", describe(&snapshot, tasks)),
        Trigger::Request => info!(tasks, "{}", describe(&snapshot, tasks)),
    }
}

fn describe(snapshot: &ProcessSnapshot, tasks: usize) -> String {
    format!(
        "pid={} tasks={} threads={} rss={} cpu={:.1}% state={:?}",
        snapshot.pid,
        tasks,
        snapshot.threads,
        format_bytes(snapshot.memory_bytes),
        snapshot.cpu_percent,
        snapshot.state
    )
}

/// SIGUSR2 requests for an immediate report.
struct StatsRequests {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl StatsRequests {
    #[cfg(unix)]
    fn register() -> Self {
        use tokio::signal::unix::{SignalKind, signal};

        let signal = match signal(SignalKind::user_defined2()) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!(error = %e, "failed to register SIGUSR2 handler, stats on request disabled");
                None
            }
        };
        Self { signal }
    }

    #[cfg(not(unix))]
    fn register() -> Self {
        Self {}
    }

    /// Waits for the next request. Pends forever when no source exists.
    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_some() {
                return;
            }
            self.signal = None;
        }
        std::future::pending::<()>().await;
    }
}

/// Formats a byte count with a binary unit suffix.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
