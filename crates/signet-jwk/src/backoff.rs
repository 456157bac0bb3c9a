//! Retry backoff policies
//!
//! A policy paces retry attempts *within* one fetch-pipeline call. It never
//! influences the registry's refresh schedule: after a failed refresh the
//! timer always resets to the target's minimum refresh interval.

use std::time::Duration;

/// How a failed fetch attempt is retried
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// No retries: the first failure is final
    #[default]
    Null,

    /// Fixed delay between attempts
    Constant {
        /// Delay before each retry
        interval: Duration,
        /// Retries allowed after the initial attempt
        max_attempts: u32,
    },

    /// Delay doubling per attempt, capped
    Exponential {
        /// Delay before the first retry
        initial: Duration,
        /// Upper bound for any single delay
        max_interval: Duration,
        /// Retries allowed after the initial attempt
        max_attempts: u32,
    },
}

impl BackoffPolicy {
    /// Delay to observe before retry number `attempt` (1-based)
    ///
    /// `None` means the policy is exhausted and the error should surface.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Null => None,
            Self::Constant {
                interval,
                max_attempts,
            } => (attempt <= *max_attempts).then_some(*interval),
            Self::Exponential {
                initial,
                max_interval,
                max_attempts,
            } => {
                if attempt > *max_attempts {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                Some(initial.saturating_mul(factor).min(*max_interval))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_never_retries() {
        assert_eq!(BackoffPolicy::Null.delay_before(1), None);
    }

    #[test]
    fn test_constant_stops_after_max_attempts() {
        let policy = BackoffPolicy::Constant {
            interval: Duration::from_millis(50),
            max_attempts: 2,
        };
        assert_eq!(policy.delay_before(1), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay_before(3), None);
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            initial: Duration::from_millis(100),
            max_interval: Duration::from_millis(350),
            max_attempts: 4,
        };
        assert_eq!(policy.delay_before(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_millis(350)));
        assert_eq!(policy.delay_before(4), Some(Duration::from_millis(350)));
        assert_eq!(policy.delay_before(5), None);
    }
}
