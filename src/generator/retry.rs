//! Retry budget for the counter compare-and-swap loop.

use std::time::Duration;

use backon::ConstantBuilder;

/// Bounds how many counter writes one `generate` call may attempt.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total write attempts, including the first one.
    pub max_attempts: usize,
    /// Fixed pause between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Creates a RetryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SEQMINT_COUNTER_MAX_ATTEMPTS`: Total write attempts (default: 3)
    /// - `SEQMINT_COUNTER_RETRY_DELAY_MS`: Pause between attempts in ms (default: 100)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_attempts: std::env::var("SEQMINT_COUNTER_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.max_attempts),
            retry_delay_ms: std::env::var("SEQMINT_COUNTER_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retry_delay_ms),
        }
    }

    /// Constant backoff allowing `max_attempts - 1` retries after the first try.
    pub fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.retry_delay_ms))
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}
