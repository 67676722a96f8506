//! Test error types.

use std::time::Duration;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Testing errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Harness error.
    #[error("harness error: {0}")]
    Harness(String),

    /// Timeout.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Supervisor error.
    #[error("supervisor error: {0}")]
    Chisel(#[from] chisel_core::ChiselError),
}

impl TestError {
    /// Creates a harness error.
    #[must_use]
    pub fn harness(msg: impl Into<String>) -> Self {
        Self::Harness(msg.into())
    }
}
