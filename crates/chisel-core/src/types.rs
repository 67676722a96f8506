//! Core types for the supervisor lifecycle.
//!
//! State transitions follow a strict one-way machine:
//! ```text
//! Active → ShutdownRequested → Closed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating mode selected by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Accepts tunnel clients.
    Server,
    /// Connects to a tunnel server.
    Client,
}

impl Mode {
    /// Lowercase name, as used on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }

    /// Capitalized name for the start of a log line.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Server => "Server",
            Self::Client => "Client",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Engine constructed and its start task launched.
    Active,
    /// A termination signal was observed; close is in flight.
    ShutdownRequested,
    /// Close finished or the close timeout elapsed.
    Closed,
}

/// How the close phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownOutcome {
    /// The engine's close returned within the timeout.
    Graceful,
    /// The timeout elapsed first; the process stops waiting.
    TimedOut,
}

/// Termination signals the supervisor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Interrupt (Ctrl+C).
    Int,
    /// Terminate.
    Term,
}
