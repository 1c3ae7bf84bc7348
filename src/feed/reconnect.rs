//! Reconnection policy for the streaming connection.

use std::time::Duration;

/// Reconnection configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 keeps the delay fixed).
    pub backoff_multiplier: f64,
    /// Reconnect attempts allowed without a successful open in between.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(3000), 5)
    }
}

impl ReconnectConfig {
    /// Fixed delay between attempts, capped at `max_attempts`.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            max_attempts,
        }
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let clamped_ms = delay_ms.min(self.max_delay.as_millis() as f64).max(0.0) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Tracks consecutive reconnect attempts.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a new policy.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Schedule the next attempt.
    ///
    /// Returns `None` once `max_attempts` reconnects have been scheduled
    /// since the last [`reset`](Self::reset).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.config.delay_for(self.attempts))
    }

    /// Forget previous failures after a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive reconnect attempts scheduled so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured cap.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
