//! Linear backoff for push channel reconnection.
//!
//! Delays grow linearly with the attempt number (`attempt * base_delay`)
//! and the attempt count is capped. An optional jitter factor spreads
//! simultaneous reconnects; the pre-jitter sequence stays monotonically
//! non-decreasing.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Reconnect delay calculator with a bounded attempt budget.
pub struct ReconnectBackoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Get the delay before the next attempt, or `None` when the attempt
    /// budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let base_delay = self.config.base_delay_ms.saturating_mul(self.attempt as u64);

        // Apply jitter only if jitter_factor > 0
        let final_delay = if self.config.jitter_factor > 0.0 {
            let jitter_range = base_delay as f64 * self.config.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (base_delay as f64 + jitter).max(1.0) as u64
        } else {
            base_delay
        };

        Some(Duration::from_millis(final_delay))
    }

    /// Reset the backoff after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the attempt budget is used up.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }
}
