//! Retry decisions for a single delivery.
//!
//! ```text
//!            Rejected            Rejected
//! TryRich ─────────────▶ TryPlain ─────────▶ GiveUp(TransportRejected)
//!    │  ▲                    │
//!    │  └── Retry(wait) ◀────┤ RateLimited / Timeout, budget left
//!    │                       │
//!    └──────────────┬────────┘
//!                   ▼
//!   GiveUp(...)  on Fatal, Unknown, or an exhausted budget
//! ```
//!
//! Rate-limit and transient retries draw from one shared budget. A retry
//! always restarts at the rich rendering.

use std::time::Duration;

use crate::delivery::FailureReason;
use crate::models::DeliveryConfig;
use crate::notify::ChannelError;

/// Next action for a delivery in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    TryRich,
    TryPlain,
    Retry(Duration),
    GiveUp(FailureReason),
}

/// Retry budget and wait computation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt, shared across error kinds
    pub max_retries: u32,
    /// Added to the channel's requested cooldown
    pub rate_limit_margin: Duration,
    /// Base of the exponential transient backoff, in seconds
    pub backoff_base_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            rate_limit_margin: Duration::from_secs(config.rate_limit_margin_secs),
            backoff_base_secs: config.backoff_base_secs,
        }
    }

    /// Wait before the given retry (1-based): `base^retry + 1` seconds.
    pub fn backoff(&self, retry: u32) -> Duration {
        let secs = self
            .backoff_base_secs
            .saturating_pow(retry)
            .saturating_add(1);
        Duration::from_secs(secs)
    }

    /// Decide what follows a failed call, given the retries already spent.
    ///
    /// `Rejected` is handled by the caller since its meaning depends on the
    /// rendering that was tried; here it is terminal.
    pub fn after_error(&self, error: &ChannelError, retries: u32) -> Step {
        let budget_left = retries < self.max_retries;
        match error {
            ChannelError::RateLimited { retry_after } if budget_left => {
                Step::Retry(*retry_after + self.rate_limit_margin)
            }
            ChannelError::RateLimited { .. } => Step::GiveUp(FailureReason::RateLimitedExhausted),
            ChannelError::Timeout(_) if budget_left => Step::Retry(self.backoff(retries + 1)),
            ChannelError::Timeout(_) => Step::GiveUp(FailureReason::TimeoutExhausted),
            ChannelError::Rejected(_) | ChannelError::Fatal(_) => {
                Step::GiveUp(FailureReason::TransportRejected)
            }
            ChannelError::Unknown(_) => Step::GiveUp(FailureReason::Unknown),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (1..=3).map(|k| policy.backoff(k).as_secs()).collect();
        assert_eq!(waits, vec![3, 5, 9]);
    }

    #[test]
    fn test_rate_limit_adds_margin() {
        let policy = RetryPolicy::default();
        let error = ChannelError::RateLimited {
            retry_after: Duration::from_secs(7),
        };
        assert_eq!(
            policy.after_error(&error, 0),
            Step::Retry(Duration::from_secs(8))
        );
    }

    #[test]
    fn test_shared_budget_exhaustion() {
        let policy = RetryPolicy::default();
        let limited = ChannelError::RateLimited {
            retry_after: Duration::from_secs(1),
        };
        let timeout = ChannelError::Timeout("read timed out".into());

        assert_eq!(
            policy.after_error(&limited, 3),
            Step::GiveUp(FailureReason::RateLimitedExhausted)
        );
        assert_eq!(
            policy.after_error(&timeout, 3),
            Step::GiveUp(FailureReason::TimeoutExhausted)
        );
        assert_eq!(
            policy.after_error(&timeout, 2),
            Step::Retry(Duration::from_secs(9))
        );
    }

    #[test]
    fn test_terminal_errors() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.after_error(&ChannelError::Fatal("chat not found".into()), 0),
            Step::GiveUp(FailureReason::TransportRejected)
        );
        assert_eq!(
            policy.after_error(&ChannelError::Unknown("302".into()), 0),
            Step::GiveUp(FailureReason::Unknown)
        );
    }
}
