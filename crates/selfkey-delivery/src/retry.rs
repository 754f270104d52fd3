//! Retry policy for failed delivery attempts.
//!
//! Linear backoff: after attempt n the next attempt waits n times the
//! subscription's base delay. A subscription with `retry_count = n` gets at
//! most n attempts in total.

use std::time::Duration;

use selfkey_core::models::WebhookSubscription;

/// Per-subscription retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per delivery chain. At least 1.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Derives the policy from a subscription's stored configuration.
    ///
    /// Non-positive values are clamped so every chain makes at least one
    /// attempt and never sleeps a negative duration.
    pub fn from_subscription(sub: &WebhookSubscription) -> Self {
        Self {
            max_attempts: u32::try_from(sub.retry_count).unwrap_or(0).max(1),
            base_delay: Duration::from_secs(u64::try_from(sub.retry_delay_seconds).unwrap_or(0)),
        }
    }

    /// Decides what happens after a failed attempt.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt < self.max_attempts {
            RetryDecision::Retry { delay: self.base_delay * attempt }
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: u32::try_from(WebhookSubscription::DEFAULT_RETRY_COUNT).unwrap_or(3),
            base_delay: Duration::from_secs(
                u64::try_from(WebhookSubscription::DEFAULT_RETRY_DELAY_SECONDS).unwrap_or(30),
            ),
        }
    }
}

/// What the delivery loop does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make the next attempt.
    Retry {
        /// Time to wait before the next attempt.
        delay: Duration,
    },
    /// The chain is exhausted.
    GiveUp,
}

#[cfg(test)]
mod tests {
    use selfkey_core::models::TenantId;

    use super::*;

    #[test]
    fn delays_grow_linearly() {
        let policy = RetryPolicy { max_attempts: 4, base_delay: Duration::from_secs(30) };

        assert_eq!(policy.decide(1), RetryDecision::Retry { delay: Duration::from_secs(30) });
        assert_eq!(policy.decide(2), RetryDecision::Retry { delay: Duration::from_secs(60) });
        assert_eq!(policy.decide(3), RetryDecision::Retry { delay: Duration::from_secs(90) });
        assert_eq!(policy.decide(4), RetryDecision::GiveUp);
    }

    #[test]
    fn retry_count_bounds_total_attempts() {
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_secs(10) };

        // Attempts 1 and 2 retry, attempt 3 is the last
        assert!(matches!(policy.decide(1), RetryDecision::Retry { .. }));
        assert!(matches!(policy.decide(2), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
    }

    #[test]
    fn subscription_values_are_clamped() {
        let mut sub = WebhookSubscription::new(TenantId::new(), "test", "https://example.com");
        sub.retry_count = 0;
        sub.retry_delay_seconds = -5;

        let policy = RetryPolicy::from_subscription(&sub);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::ZERO);
        assert_eq!(policy.decide(1), RetryDecision::GiveUp);
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy { max_attempts: 1, base_delay: Duration::from_secs(30) };
        assert_eq!(policy.decide(1), RetryDecision::GiveUp);
    }
}
