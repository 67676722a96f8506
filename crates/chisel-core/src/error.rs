//! Error types for chisel-core.
//!
//! Configuration, start and PID-file failures end the process. Close failures
//! are logged and swallowed by the orchestrator.

use std::path::PathBuf;

use crate::flags::FormatError;

/// Result type alias for chisel operations.
pub type Result<T> = std::result::Result<T, ChiselError>;

/// Error type for supervisor and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum ChiselError {
    /// Malformed flags, missing positional arguments, invalid values.
    #[error("configuration error: {0}")]
    Config(String),

    /// A repeated flag value could not be parsed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The engine's start operation failed.
    #[error("engine start failed: {0}")]
    EngineStart(String),

    /// The engine's close operation failed.
    #[error("engine close failed: {0}")]
    EngineClose(String),

    /// The PID file could not be written.
    #[error("failed to write pid file {}: {source}", path.display())]
    PidFile {
        /// Target path of the PID file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Key file generation failed.
    #[error("key generation failed: {0}")]
    KeyGen(String),

    /// Signal handler registration failed.
    #[error("signal error: {0}")]
    Signal(String),

    /// Network failure inside an engine.
    #[error("network error: {0}")]
    Network(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChiselError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an engine start error.
    #[must_use]
    pub fn engine_start(msg: impl Into<String>) -> Self {
        Self::EngineStart(msg.into())
    }

    /// Creates an engine close error.
    #[must_use]
    pub fn engine_close(msg: impl Into<String>) -> Self {
        Self::EngineClose(msg.into())
    }

    /// Creates a key generation error.
    #[must_use]
    pub fn keygen(msg: impl Into<String>) -> Self {
        Self::KeyGen(msg.into())
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if this error is a configuration problem detected before
    /// any engine was started.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Format(_))
    }
}
