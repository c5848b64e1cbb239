//! Retry policy applied when a worker iteration fails
//!
//! The default policy restarts the failed iteration immediately and never
//! gives up. Hardened deployments can bound the number of consecutive
//! failures and back off exponentially between restarts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry configuration for the worker loop boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failures tolerated before the worker stops (0 = unlimited)
    #[serde(default)]
    pub max_consecutive_failures: u32,
    /// Delay before the first restart in milliseconds (0 = restart immediately)
    #[serde(default)]
    pub initial_delay_ms: u64,
    /// Maximum restart delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_delay() -> u64 {
    30000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 0,
            initial_delay_ms: 0,
            max_delay_ms: 30000,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Bounded exponential backoff starting at `initial_delay_ms`
    pub fn exponential(initial_delay_ms: u64, max_delay_ms: u64, max_failures: u32) -> Self {
        Self {
            max_consecutive_failures: max_failures,
            initial_delay_ms,
            max_delay_ms,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Whether `failures` consecutive failures exhaust this policy
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_consecutive_failures != 0 && failures >= self.max_consecutive_failures
    }

    /// Calculate the pause before restarting after `failures` consecutive failures (1-indexed)
    pub fn calculate_delay(&self, failures: u32) -> Duration {
        if failures == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = (failures - 1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        // Add jitter
        let jitter_range = capped_delay * self.jitter.clamp(0.0, 1.0);
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped_delay + jitter).max(0.0) as u64;

        Duration::from_millis(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_restarts_immediately_forever() {
        let retry = RetryConfig::default();
        assert_eq!(retry.calculate_delay(1), Duration::ZERO);
        assert_eq!(retry.calculate_delay(50), Duration::ZERO);
        assert!(!retry.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_exponential_growth_without_jitter() {
        let retry = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::exponential(100, 1000, 5)
        };
        assert_eq!(retry.calculate_delay(0), Duration::ZERO);
        assert_eq!(retry.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(retry.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(retry.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(retry.calculate_delay(5), Duration::from_millis(1000));
        assert_eq!(retry.calculate_delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_exhaustion() {
        let retry = RetryConfig::exponential(10, 100, 3);
        assert!(!retry.is_exhausted(2));
        assert!(retry.is_exhausted(3));
        assert!(retry.is_exhausted(4));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_jittered_cap(
            initial in 1u64..5_000,
            max in 1u64..60_000,
            jitter in 0.0f64..1.0,
            failures in 1u32..200,
        ) {
            let retry = RetryConfig {
                max_consecutive_failures: 0,
                initial_delay_ms: initial,
                max_delay_ms: max,
                multiplier: 2.0,
                jitter,
            };
            let delay = retry.calculate_delay(failures).as_millis() as f64;
            prop_assert!(delay <= max as f64 * (1.0 + jitter) + 1.0);
        }
    }
}
