use crate::model::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Consecutive-failure tracker for the result poller.
pub(crate) struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    jitter: bool,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            jitter: true,
        }
    }

    #[cfg(test)]
    fn without_jitter(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            jitter: false,
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries
    }

    /// Record a failure. Returns the delay before the next attempt, or `None` once the
    /// retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.policy.max_retries {
            return None;
        }
        let exp = self.failures.saturating_sub(1).min(16);
        let raw = self.policy.base_delay.saturating_mul(1u32 << exp);
        let capped = raw.min(self.policy.max_delay);
        if !self.jitter {
            return Some(capped);
        }
        // Up to 20% either way, never above the cap.
        let factor = rand::thread_rng().gen_range(0.8..=1.2);
        Some(capped.mul_f64(factor).min(self.policy.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let mut b = Backoff::without_jitter(policy(5));
        let delays: Vec<_> = std::iter::from_fn(|| b.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn zero_retries_fails_on_first_error() {
        let mut b = Backoff::new(policy(0));
        assert_eq!(b.next_delay(), None);
        assert_eq!(b.failures(), 1);
    }

    #[test]
    fn reset_restores_budget() {
        let mut b = Backoff::without_jitter(policy(1));
        assert!(b.next_delay().is_some());
        assert!(b.next_delay().is_none());
        b.reset();
        assert_eq!(b.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut b = Backoff::new(policy(3));
        for _ in 0..3 {
            let d = b.next_delay().unwrap();
            assert!(d >= Duration::from_millis(400), "{d:?}");
            assert!(d <= Duration::from_secs(3), "{d:?}");
        }
    }
}
