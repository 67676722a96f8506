//! Observability error types.

/// Result type alias for observe operations.
pub type Result<T> = std::result::Result<T, ObserveError>;

/// Observability errors.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    /// Sampling error.
    #[error("monitor error: {0}")]
    Monitor(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObserveError {
    /// Creates a monitor error.
    #[must_use]
    pub fn monitor(msg: impl Into<String>) -> Self {
        Self::Monitor(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_error() {
        let err = ObserveError::monitor("malformed /proc/self/stat");
        assert!(err.to_string().contains("monitor error"));
        assert!(err.to_string().contains("/proc/self/stat"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no procfs");
        let err: ObserveError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
