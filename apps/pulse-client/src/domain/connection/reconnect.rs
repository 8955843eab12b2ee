//! Reconnection Policy
//!
//! Failure `n` (1-based) waits `base_delay * 2^(n-1)`. There is no delay
//! ceiling; the attempt cap is what bounds the schedule. After
//! `max_attempts` failures the policy stops handing out delays until reset.
//!
//! Jitter is off by default. When set, a uniform random extra in
//! `[0, jitter]` is added on top of the doubled delay.

use std::time::Duration;

use rand::Rng;

/// Backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Failures before giving up (0 = never give up).
    pub max_attempts: u32,
    /// Largest random extra added to each delay.
    pub jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 5)
    }
}

impl ReconnectConfig {
    /// Doubling backoff from `base_delay`, stopping after `max_attempts`.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            jitter: Duration::ZERO,
        }
    }

    /// Add up to `jitter` of random delay to every attempt.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay for the `attempt`-th failure, before jitter. Saturates at `Duration::MAX`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .map_or(Duration::MAX, |factor| self.base_delay.saturating_mul(factor))
    }
}

/// Attempt counter over a `ReconnectConfig`.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy with no failures recorded.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    ///
    /// Returns `None` once `max_attempts` failures have been recorded.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempt_count += 1;
        let delay = self.config.delay_for(self.attempt_count);
        Some(delay.saturating_add(self.jitter()))
    }

    /// Forget recorded failures after a successful connection or a manual retry.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Failures recorded since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_millis = u64::try_from(self.config.jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=max_millis))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn policy(base_ms: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig::new(
            Duration::from_millis(base_ms),
            max_attempts,
        ))
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.jitter, Duration::ZERO);
    }

    #[test]
    fn delays_double_from_base() {
        let mut policy = policy(100, 0);
        let delays: Vec<_> = (0..4).map(|_| policy.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn long_schedules_are_not_flattened() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_secs(10), 6));
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay())
            .map(|delay| delay.as_secs())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320]);
    }

    #[test_case(1, 1_000)]
    #[test_case(8, 128_000)]
    #[test_case(12, 2_048_000)]
    fn delay_for_attempt(attempt: u32, expected_ms: u64) {
        let config = ReconnectConfig::new(Duration::from_secs(1), 12);
        assert_eq!(config.delay_for(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn huge_attempts_saturate() {
        let config = ReconnectConfig::new(Duration::from_secs(1), 0);
        assert_eq!(config.delay_for(33), Duration::MAX);
        assert_eq!(config.delay_for(u32::MAX), Duration::MAX);
    }

    #[test]
    fn stops_after_max_attempts() {
        let mut policy = policy(100, 3);
        for expected in 1..=3 {
            assert!(policy.next_delay().is_some());
            assert_eq!(policy.attempt_count(), expected);
        }
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn reset_restarts_schedule() {
        let mut policy = policy(100, 3);
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn jitter_only_adds() {
        let config =
            ReconnectConfig::new(Duration::from_millis(1000), 1).with_jitter(Duration::from_millis(100));
        for _ in 0..100 {
            let millis = ReconnectPolicy::new(config).next_delay().unwrap().as_millis();
            assert!((1000..=1100).contains(&millis), "delay {millis}ms out of bounds");
        }
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = policy(10, 0);
        for _ in 0..1000 {
            assert!(policy.next_delay().is_some());
        }
    }
}
