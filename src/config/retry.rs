//! Retry configuration for filesystem and container housekeeping.
//!
//! Removing a checkout that a container just released, or copying files out
//! of a freshly started container, can fail transiently. These operations are
//! retried with a bounded, fixed-delay loop.
//!
//! # Configuration Example
//!
//! ```toml
//! [retry]
//! max_attempts = 15
//! delay_ms = 1000
//! strategy = "constant"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for housekeeping operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 15)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds (default: 1000)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Retry strategy (default: constant)
    #[serde(default)]
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// A policy that retries immediately; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
            strategy: RetryStrategy::Constant,
        }
    }

    /// Get the base delay as a Duration.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Calculate the delay after a failed attempt.
    ///
    /// The attempt number is 1-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.delay_ms as f64;
        let delay_ms = match self.strategy {
            RetryStrategy::Constant => base_ms,
            RetryStrategy::Linear => base_ms * (attempt as f64),
            RetryStrategy::Exponential => base_ms * 2.0_f64.powi(attempt.saturating_sub(1) as i32),
        };

        // Cap single delay at 100x base
        Duration::from_millis(delay_ms as u64).min(self.base_delay() * 100)
    }

    /// Check if another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Retry delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Same delay between each retry.
    #[default]
    Constant,
    /// Delay increases linearly: base * attempt.
    Linear,
    /// Delay doubles each attempt: base * 2^(attempt-1).
    Exponential,
}

// Default value functions for serde
fn default_max_attempts() -> u32 {
    15
}

fn default_delay_ms() -> u64 {
    1000
}
