//! Reconnection backoff
//!
//! Delay before retry `n` (1-based) is `initial_delay * 2^(n-1)`, capped at
//! `max_delay`. No jitter: the schedule is monotone and reproducible.

use std::time::Duration;

use crate::config::{ConnectionConfig, RetryPolicy};

/// Reconnection policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            retry: RetryPolicy::Unbounded,
        }
    }
}

impl ReconnectPolicy {
    /// Create from configuration values
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            retry: config.retry,
        }
    }

    /// Delay to wait after the `attempt`-th consecutive failure
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        match 2u32.checked_pow(exponent) {
            Some(factor) => self.initial_delay.saturating_mul(factor).min(self.max_delay),
            None => self.max_delay,
        }
    }

    /// Whether another attempt may be scheduled after `failures` failures
    pub fn allows_retry(&self, failures: u32) -> bool {
        match self.retry {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded { max_retries } => failures < max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(initial_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            retry: RetryPolicy::Unbounded,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = policy(100, 10_000);

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_max_delay_limit() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(60), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_bounded_retries() {
        let policy = ReconnectPolicy {
            retry: RetryPolicy::Bounded { max_retries: 2 },
            ..ReconnectPolicy::default()
        };

        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(ReconnectPolicy::default().allows_retry(u32::MAX));
    }

    proptest! {
        #[test]
        fn delays_are_monotone_and_capped(
            initial in 1u64..5_000,
            extra in 0u64..120_000,
            attempt in 1u32..200,
        ) {
            let policy = policy(initial, initial + extra);
            let current = policy.delay_for(attempt);
            let next = policy.delay_for(attempt + 1);

            prop_assert!(current <= next);
            prop_assert!(next <= policy.max_delay);
            prop_assert!(current >= policy.initial_delay.min(policy.max_delay));
        }
    }
}
