use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::ValidationError;

/// Upper bound on any single backoff delay, whatever the policy says.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_delay.is_zero() {
            return Err(ValidationError::InvalidPolicy(
                "retry base delay must be positive".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ValidationError::InvalidPolicy(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_delay.is_some_and(|cap| cap < self.base_delay) {
            return Err(ValidationError::InvalidPolicy(
                "max retry delay must not be below the base delay".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    FinalFailure,
}

/// Decides what happens after a failed attempt.
///
/// Attempts are numbered from 1. Attempt `n` is retried iff `n <= max_retries`,
/// after `base_delay * multiplier^(n-1)`, capped by `max_delay` when set and
/// never longer than [`MAX_RETRY_DELAY`].
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn on_failure(&self, attempt: u32) -> RetryDecision {
        if attempt >= 1 && attempt <= self.policy.max_retries {
            RetryDecision::Retry(self.calculate_backoff(attempt))
        } else {
            RetryDecision::FinalFailure
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_retries.saturating_add(1)
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let backoff = self.policy.base_delay.as_secs_f64() * self.policy.multiplier.powi(exponent);

        let result = Duration::try_from_secs_f64(backoff).unwrap_or(MAX_RETRY_DELAY);
        let cap = self.policy.max_delay.unwrap_or(MAX_RETRY_DELAY).min(MAX_RETRY_DELAY);
        result.min(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller(max_retries: u32, base_secs: u64, multiplier: f64) -> RetryController {
        RetryController::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(base_secs),
            multiplier,
            max_delay: None,
        })
    }

    #[test]
    fn doubles_from_sixty_seconds() {
        let retry = controller(3, 60, 2.0);
        assert_eq!(retry.max_attempts(), 4);
        let delays: Vec<_> = (1..=retry.max_attempts()).map(|a| retry.on_failure(a)).collect();
        assert_eq!(
            delays,
            vec![
                RetryDecision::Retry(Duration::from_secs(60)),
                RetryDecision::Retry(Duration::from_secs(120)),
                RetryDecision::Retry(Duration::from_secs(240)),
                RetryDecision::FinalFailure,
            ]
        );
    }

    #[test]
    fn zero_retries_fails_immediately() {
        assert_eq!(controller(0, 1, 2.0).on_failure(1), RetryDecision::FinalFailure);
    }

    #[test]
    fn cap_bounds_the_delay() {
        let retry = RetryController::new(RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            multiplier: 10.0,
            max_delay: Some(Duration::from_secs(30)),
        });
        assert_eq!(retry.on_failure(3), RetryDecision::Retry(Duration::from_secs(30)));
    }

    #[test]
    fn runaway_growth_is_clamped() {
        let retry = controller(40, 60, 1e9);
        assert_eq!(retry.on_failure(2), RetryDecision::Retry(MAX_RETRY_DELAY));
        assert_eq!(retry.on_failure(40), RetryDecision::Retry(MAX_RETRY_DELAY));
        assert_eq!(
            controller(u32::MAX, 1, 2.0).on_failure(u32::MAX),
            RetryDecision::Retry(MAX_RETRY_DELAY)
        );
    }

    #[test]
    fn validate_rejects_bad_multiplier() {
        let policy = RetryPolicy {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(matches!(policy.validate(), Err(ValidationError::InvalidPolicy(_))));
    }

    proptest! {
        #[test]
        fn delays_never_shrink(max_retries in 1u32..12, base in 1u64..120, multiplier in 1.0f64..4.0) {
            let retry = controller(max_retries, base, multiplier);
            let mut previous = Duration::ZERO;
            for attempt in 1..=max_retries {
                match retry.on_failure(attempt) {
                    RetryDecision::Retry(delay) => {
                        prop_assert!(delay >= previous);
                        previous = delay;
                    }
                    RetryDecision::FinalFailure => prop_assert!(false, "attempt {} should retry", attempt),
                }
            }
            prop_assert_eq!(retry.on_failure(max_retries + 1), RetryDecision::FinalFailure);
        }
    }
}
