use std::collections::BTreeSet;
use std::time::Duration;

/// Which responses are retried, how often, and how long to wait.
///
/// The wait before attempt `n + 1` is `backoff_base * 2^(n - 1)`, capped at
/// `max_backoff`. A `Retry-After` header (in seconds) replaces the computed
/// wait when `respect_retry_after` is set, still capped.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub retry_statuses: BTreeSet<u16>,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    pub respect_retry_after: bool,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    /// Generic gateway-error policy: only 502 is retried, patiently.
    fn default() -> Self {
        Self {
            retry_statuses: BTreeSet::from([502]),
            max_attempts: 12,
            backoff_base: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
            respect_retry_after: true,
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Provider-specific policy retrying the given statuses with a short backoff.
    pub fn transient(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            retry_statuses: statuses.into_iter().collect(),
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.max_backoff = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.max_backoff)
    }

    /// Wait honoring a server-provided `Retry-After` value.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => hint.min(self.max_backoff),
            _ => self.delay(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(502));
        assert!(!policy.should_retry(429));
        assert!(!policy.should_retry(500));
        assert_eq!(policy.max_attempts, 12);
    }

    #[test]
    fn test_transient_policy() {
        let policy = RetryPolicy::transient([429, 500, 502, 503, 504]);
        assert!(policy.should_retry(429));
        assert!(policy.should_retry(504));
        assert!(!policy.should_retry(404));
        assert!(policy.backoff_base < RetryPolicy::default().backoff_base);
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(10));
        assert_eq!(policy.delay(2), Duration::from_secs(20));
        assert_eq!(policy.delay(3), Duration::from_secs(40));
        assert_eq!(policy.delay(6), Duration::from_secs(300));
        assert_eq!(policy.delay(40), Duration::from_secs(300));
    }

    #[test]
    fn test_retry_after_hint() {
        let policy = RetryPolicy::transient([429]);
        assert_eq!(
            policy.delay_with_hint(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_with_hint(1, Some(Duration::from_secs(3600))),
            Duration::from_secs(60)
        );

        let ignoring = policy.respect_retry_after(false);
        assert_eq!(
            ignoring.delay_with_hint(1, Some(Duration::from_secs(7))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_max_attempts_at_least_one() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }
}
