// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::Duration;

pub const TOO_MANY_REQUESTS: u16 = 429;

/// How a page request reacts to throttling. Attempts are 1-based and
/// include the first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(2),
            multiplier: 2,
            max_backoff: Duration::from_secs(30),
            retryable_statuses: vec![TOO_MANY_REQUESTS],
        }
    }
}

impl RetryPolicy {
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Wait before the next attempt, or `None` when `attempt` was the last
    /// one allowed for this status.
    pub fn next_delay(&self, status: u16, attempt: u32) -> Option<Duration> {
        if !self.is_retryable(status) || attempt >= self.max_attempts {
            return None;
        }
        Some(self.backoff(attempt))
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, TOO_MANY_REQUESTS};
    use std::time::Duration;

    #[test]
    fn default_policy_retries_only_throttling() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(TOO_MANY_REQUESTS));
        assert!(!policy.is_retryable(500));
        assert!(!policy.is_retryable(404));
        assert_eq!(policy.next_delay(500, 1), None);
    }

    #[test]
    fn backoff_grows_geometrically_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(2),
            multiplier: 3,
            max_backoff: Duration::from_secs(30),
            retryable_statuses: vec![TOO_MANY_REQUESTS],
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(6));
        assert_eq!(policy.backoff(3), Duration::from_secs(18));
        assert_eq!(policy.backoff(4), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn attempts_stop_at_the_limit() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(policy.next_delay(TOO_MANY_REQUESTS, 1).is_some());
        assert!(policy.next_delay(TOO_MANY_REQUESTS, 2).is_some());
        assert_eq!(policy.next_delay(TOO_MANY_REQUESTS, 3), None);
    }

    #[test]
    fn never_policy_makes_a_single_attempt() {
        assert_eq!(RetryPolicy::never().next_delay(TOO_MANY_REQUESTS, 1), None);
    }

    #[test]
    fn multiplier_of_one_keeps_a_fixed_delay() {
        let policy = RetryPolicy {
            multiplier: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), policy.backoff(3));
    }
}
