// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # chisel-core
//!
//! Lifecycle primitives for the chisel tunnel supervisor.
//!
//! This crate provides:
//!
//! - [`Engine`] trait, the construct/start/close contract for tunnel engines
//! - [`Orchestrator`] driving an engine from start to bounded-time close
//! - [`ShutdownContext`], the one-shot cancellation shared with the signal handler
//! - [`ServerConfig`] / [`ClientConfig`] records and the [`FlagValue`] parsers
//!   that fill their repeated fields
//!
//! ## Example
//!
//! ```rust,ignore
//! use chisel_core::{Mode, Orchestrator, OsSignals, ShutdownContext, spawn_interrupt_handler};
//!
//! let shutdown = ShutdownContext::new();
//! spawn_interrupt_handler(OsSignals::register()?, shutdown.clone());
//!
//! let engine = MyEngine::new(config)?;
//! let outcome = Orchestrator::new(Mode::Server, engine, shutdown).run().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod headers;
pub mod orchestrator;
pub mod pidfile;
pub mod shutdown;
pub mod signal;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use config::{
    ClientConfig, ClientTlsConfig, DEFAULT_HOST, DEFAULT_KEEPALIVE, DEFAULT_PORT, KeySource,
    ServerConfig, ServerTlsConfig,
};
pub use engine::Engine;
pub use error::{ChiselError, Result};
pub use flags::{FlagValue, FormatError, HeaderFlags, MultiFlag};
pub use headers::HeaderMap;
pub use orchestrator::{CLOSE_TIMEOUT, Orchestrator};
pub use pidfile::{PID_FILE_NAME, write_pid_file_in};
pub use shutdown::ShutdownContext;
pub use signal::{ChannelSignals, OsSignals, SignalHandle, SignalSource, spawn_interrupt_handler};
pub use types::{LifecycleState, Mode, ShutdownOutcome, Signal};
