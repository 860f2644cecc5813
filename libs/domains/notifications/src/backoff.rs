//! Exponential backoff policies for delivery retries.
//!
//! Each channel retries on its own schedule: push is near-real-time and
//! retries aggressively, email providers throttle hard and get long delays.

use std::time::Duration;

/// Exponential backoff with an initial delay doubling per attempt, capped
/// at a maximum delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Email: 60s initial, 600s cap.
    pub const fn email() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    /// SMS: 10s initial, 180s cap.
    pub const fn sms() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(180))
    }

    /// Push: 1s initial, 60s cap.
    pub const fn push() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }

    /// In-app: 5s initial, 60s cap.
    pub const fn in_app() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60))
    }

    /// Poller's queue-publish failures: 60s initial, 900s cap.
    pub const fn queue_publish() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(900))
    }

    /// Delay to wait before the given attempt is retried.
    ///
    /// `attempt` is the 1-based count of attempts already made: after the
    /// first failure (`attempt == 1`) the delay is `initial`, doubling for
    /// each later attempt, capped at `max`.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let exp = attempt.saturating_sub(1).clamp(0, 31) as u32;
        self.initial
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_and_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(180));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(160));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(180));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(180));
    }

    #[test]
    fn test_delays_are_monotonic_and_bounded() {
        for policy in [
            BackoffPolicy::email(),
            BackoffPolicy::sms(),
            BackoffPolicy::push(),
            BackoffPolicy::in_app(),
        ] {
            let mut previous = Duration::ZERO;
            for attempt in 1..=64 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay >= previous, "delay shrank at attempt {attempt}");
                assert!(delay <= policy.max, "delay exceeded cap at attempt {attempt}");
                previous = delay;
            }
        }
    }

    #[test]
    fn test_channel_policies() {
        assert_eq!(BackoffPolicy::email().initial, Duration::from_secs(60));
        assert_eq!(BackoffPolicy::email().max, Duration::from_secs(600));
        assert_eq!(BackoffPolicy::push().initial, Duration::from_secs(1));
        assert_eq!(BackoffPolicy::push().max, Duration::from_secs(60));
        assert_eq!(BackoffPolicy::sms().initial, Duration::from_secs(10));
        assert_eq!(BackoffPolicy::sms().max, Duration::from_secs(180));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = BackoffPolicy::email();
        assert_eq!(policy.delay_for_attempt(i32::MAX), policy.max);
    }
}
