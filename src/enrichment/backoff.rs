use crate::config::EnrichmentRetryConfig;
use std::time::Duration;

/// Exponential delay policy for failed enrichment attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBackoff {
    enabled: bool,
    max_attempts: u32,
    initial: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryBackoff {
    pub fn from_config(config: &EnrichmentRetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            initial: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    pub fn retries_enabled(&self) -> bool {
        self.enabled && self.max_attempts > 0
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt number `attempt`
    ///
    /// Attempt 0 has no delay. Otherwise the delay is
    /// `initial * multiplier^(attempt - 1)`, capped at the maximum delay when
    /// one is configured.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).round();
        let candidate = if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis as u64)
        } else {
            Duration::MAX
        };
        if self.max_delay.is_zero() {
            candidate
        } else {
            candidate.min(self.max_delay)
        }
    }
}
