// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # chisel-observe
//!
//! Self-statistics for the chisel supervisor.
//!
//! - [`ProcessMonitor`] samples the current process via `/proc/self`
//! - [`spawn_stats_reporter`] logs a sample periodically and on SIGUSR2
//!
//! The reporter is fire-and-forget: it lives as long as the runtime and is
//! not tied to the shutdown context.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod monitor;
pub mod stats;

pub use error::{ObserveError, Result};
pub use monitor::{ProcessMonitor, ProcessSnapshot, ProcessState};
pub use stats::{REPORT_INTERVAL, format_bytes, spawn_stats_reporter};
