//! Reconnect backoff for the client engine.

use std::time::Duration;

/// Exponential backoff between connection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Retries allowed after the first failure; `None` is unlimited.
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Self::DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            max_retries: None,
        }
    }
}

impl BackoffConfig {
    /// Cap used when the configured maximum interval is zero.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

    /// Creates the default backoff (100ms doubling up to 5 minutes, unlimited).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay cap. Zero keeps the default cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        if !delay.is_zero() {
            self.max_delay = delay;
        }
        self
    }

    /// Sets the retry limit.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Calculates the delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_secs = self.initial_delay.as_secs_f64();
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let exp_secs = base_secs * self.multiplier.powi(exp);
        let clamped_secs = exp_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(clamped_secs)
    }

    /// Returns true once `retries` retries have used up the limit.
    #[must_use]
    pub fn exhausted(&self, retries: u32) -> bool {
        self.max_retries.is_some_and(|max| retries >= max)
    }
}
