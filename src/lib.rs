// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! chisel: a fast TCP tunnel, transported over HTTP.
//!
//! This crate is the process shell around the engines: it selects the mode,
//! resolves configuration from flags, environment and defaults, and runs the
//! engine under the shutdown orchestrator.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chisel::dispatch::{execute, parse_command};
//!
//! # async fn demo() -> chisel::core::Result<()> {
//! let command = parse_command(["chisel", "server", "--port", "9312"])?;
//! execute(command).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod dispatch;
pub mod resolve;
pub mod run;

pub use chisel_core as core;
pub use chisel_observe as observe;
pub use chisel_tunnel as tunnel;

/// Version printed by `--version`.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level usage text.
#[must_use]
pub fn usage() -> String {
    format!(
        "
  Usage: chisel [command] [--help]

  Version: {BUILD_VERSION}

  Commands:
    server - runs chisel in server mode
    client - runs chisel in client mode

  Read more:
    https://github.com/jpillora/chisel
"
    )
}

/// Prelude module for common imports.
pub mod prelude {
    pub use chisel_core::{
        ClientConfig, Engine, LifecycleState, Mode, Orchestrator, ServerConfig, ShutdownContext,
        ShutdownOutcome,
    };
    pub use chisel_tunnel::{TunnelClient, TunnelServer};

    pub use crate::dispatch::{Command, execute, parse_command};
    pub use crate::resolve::{EnvSource, Launch, ProcessEnv, ServerPlan};
}
