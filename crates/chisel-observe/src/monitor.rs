//! Self-monitoring via the /proc filesystem.
//!
//! On Linux, parses:
//! - `/proc/self/stat` - CPU time, state, threads
//! - `/proc/self/statm` - resident memory pages
//!
//! Other platforms report zeroed samples with [`ProcessState::Unknown`].

use std::time::Instant;

use crate::error::{ObserveError, Result};

/// Samples resource usage of the current process.
pub struct ProcessMonitor {
    /// Previous CPU measurement for delta calculation.
    prev_cpu: Option<CpuMeasurement>,
    /// Page size in bytes (cached from sysconf).
    #[cfg(target_os = "linux")]
    page_size: u64,
}

#[derive(Clone)]
struct CpuMeasurement {
    /// User plus system time in clock ticks.
    ticks: u64,
    wall_time: Instant,
}

impl ProcessMonitor {
    /// Creates a monitor with no prior CPU sample.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prev_cpu: None,
            #[cfg(target_os = "linux")]
            page_size: Self::page_size(),
        }
    }

    /// Takes one sample of the current process.
    ///
    /// # Errors
    /// Returns an error if /proc cannot be read or parsed.
    pub fn collect(&mut self) -> Result<ProcessSnapshot> {
        #[cfg(target_os = "linux")]
        {
            self.collect_linux()
        }

        #[cfg(not(target_os = "linux"))]
        {
            Ok(ProcessSnapshot {
                pid: std::process::id(),
                cpu_percent: 0.0,
                memory_bytes: 0,
                threads: 0,
                state: ProcessState::Unknown,
            })
        }
    }

    #[cfg(target_os = "linux")]
    fn collect_linux(&mut self) -> Result<ProcessSnapshot> {
        let now = Instant::now();

        let stat = parse_stat_content(&std::fs::read_to_string("/proc/self/stat")?)?;
        let ticks = stat.utime + stat.stime;
        let cpu_percent = self.cpu_percent(ticks, now);
        self.prev_cpu = Some(CpuMeasurement {
            ticks,
            wall_time: now,
        });

        let rss_pages = parse_statm_content(&std::fs::read_to_string("/proc/self/statm")?)?;

        Ok(ProcessSnapshot {
            pid: std::process::id(),
            cpu_percent,
            memory_bytes: rss_pages * self.page_size,
            threads: stat.num_threads,
            state: stat.state,
        })
    }

    #[cfg(target_os = "linux")]
    fn page_size() -> u64 {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        #[allow(unsafe_code)]
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as u64 } else { 4096 }
    }

    #[cfg(target_os = "linux")]
    fn cpu_percent(&self, ticks: u64, now: Instant) -> f64 {
        let Some(prev) = &self.prev_cpu else {
            return 0.0;
        };

        let elapsed = now.duration_since(prev.wall_time).as_secs_f64();
        if elapsed < 0.001 || ticks < prev.ticks {
            return 0.0;
        }

        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        #[allow(unsafe_code)]
        let clk_tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) } as f64;
        if clk_tck <= 0.0 {
            return 0.0;
        }

        ((ticks - prev.ticks) as f64 / clk_tck / elapsed) * 100.0
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ProcStat {
    state: ProcessState,
    utime: u64,
    stime: u64,
    num_threads: u32,
}

/// Parses the content of /proc/{pid}/stat.
///
/// Format: pid (comm) state ppid pgrp session tty_nr tpgid flags minflt cminflt
///         majflt cmajflt utime stime cutime cstime priority nice num_threads ...
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat_content(content: &str) -> Result<ProcStat> {
    // The command name may contain spaces and parentheses; fields start after the last ')'.
    let comm_end = content
        .rfind(')')
        .ok_or_else(|| ObserveError::monitor("malformed /proc/self/stat: no closing paren"))?;

    let fields: Vec<&str> = content
        .get(comm_end + 1..)
        .unwrap_or_default()
        .split_whitespace()
        .collect();
    if fields.len() < 18 {
        return Err(ObserveError::monitor(format!(
            "malformed /proc/self/stat: expected 18+ fields, got {}",
            fields.len()
        )));
    }

    let state = match fields[0].chars().next() {
        Some('R') => ProcessState::Running,
        Some('S') => ProcessState::Sleeping,
        Some('D') => ProcessState::DiskWait,
        Some('Z') => ProcessState::Zombie,
        Some('T' | 't') => ProcessState::Stopped,
        _ => ProcessState::Unknown,
    };

    let field = |idx: usize, name: &str| -> Result<u64> {
        fields[idx]
            .parse()
            .map_err(|_| ObserveError::monitor(format!("failed to parse {name}")))
    };

    Ok(ProcStat {
        state,
        utime: field(11, "utime")?,
        stime: field(12, "stime")?,
        num_threads: field(17, "num_threads")? as u32,
    })
}

/// Parses the resident page count out of /proc/{pid}/statm.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm_content(content: &str) -> Result<u64> {
    content
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ObserveError::monitor("malformed /proc/self/statm"))?
        .parse()
        .map_err(|_| ObserveError::monitor("failed to parse RSS pages"))
}

/// One sample of the current process.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    /// Process ID.
    pub pid: u32,
    /// CPU usage since the previous sample, in percent of one core.
    pub cpu_percent: f64,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// OS thread count.
    pub threads: u32,
    /// Scheduler state.
    pub state: ProcessState,
}

/// Process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Running.
    Running,
    /// Sleeping.
    Sleeping,
    /// Waiting for disk.
    DiskWait,
    /// Zombie.
    Zombie,
    /// Stopped.
    Stopped,
    /// Unknown.
    Unknown,
}
