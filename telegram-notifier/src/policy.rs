//! Delivery policy for a rate-limited notification channel.
//!
//! Rate-limit answers are retried a bounded number of times. After enough rate-limited
//! messages in a row the circuit opens: one emergency alert goes out and every further
//! rate-limit answer is dropped without waiting, until a delivery succeeds again.

use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct DeliveryPolicyConfig {
    /// Sends per message, the first one included.
    pub max_attempts: u32,
    /// Used when the channel does not say how long to wait.
    pub default_retry_after: Duration,
    /// Upper bound on a single wait.
    pub max_wait: Duration,
    /// Consecutive rate-limited messages that open the circuit.
    pub failure_threshold: u32,
}

impl Default for DeliveryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            default_retry_after: Duration::from_secs(60),
            max_wait: Duration::from_secs(120),
            failure_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
}

/// What to do after the channel answered "too many requests".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Wait, then send the same message again.
    Retry(Duration),
    /// Attempts for this message are used up.
    GiveUp,
    /// The circuit just opened; send the emergency alert once.
    Escalate,
    /// The circuit is open; drop the message.
    Drop,
}

#[derive(Debug)]
pub struct DeliveryPolicy {
    config: DeliveryPolicyConfig,
    state: BreakerState,
    consecutive_rate_limits: u32,
}

impl DeliveryPolicy {
    pub fn new(config: DeliveryPolicyConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            consecutive_rate_limits: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_rate_limits(&self) -> u32 {
        self.consecutive_rate_limits
    }

    pub fn on_success(&mut self) {
        if self.state == BreakerState::Open {
            info!("Notification channel recovered, closing circuit");
        }
        self.state = BreakerState::Closed;
        self.consecutive_rate_limits = 0;
    }

    /// `attempt` is zero-based for the message currently being sent. Only the first
    /// rate-limit answer of a message is counted.
    pub fn on_rate_limited(&mut self, retry_after: Option<u64>, attempt: u32) -> RateLimitDecision {
        if attempt == 0 {
            self.consecutive_rate_limits += 1;
        }

        if self.state == BreakerState::Open {
            return RateLimitDecision::Drop;
        }

        if attempt == 0 && self.consecutive_rate_limits >= self.config.failure_threshold {
            warn!(
                "Notification channel rate limited {} times in a row, opening circuit",
                self.consecutive_rate_limits
            );
            self.state = BreakerState::Open;
            return RateLimitDecision::Escalate;
        }

        if attempt + 1 >= self.config.max_attempts {
            return RateLimitDecision::GiveUp;
        }

        let wait = retry_after
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_retry_after)
            .min(self.config.max_wait);
        RateLimitDecision::Retry(wait)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::new(DeliveryPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_wait_is_capped() {
        let mut policy = DeliveryPolicy::default();
        assert_eq!(
            policy.on_rate_limited(Some(30), 0),
            RateLimitDecision::Retry(Duration::from_secs(30))
        );
        assert_eq!(
            policy.on_rate_limited(Some(3600), 0),
            RateLimitDecision::Retry(Duration::from_secs(120))
        );
        assert_eq!(
            policy.on_rate_limited(None, 0),
            RateLimitDecision::Retry(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_attempts_are_bounded() {
        let mut policy = DeliveryPolicy::default();
        assert!(matches!(
            policy.on_rate_limited(Some(1), 0),
            RateLimitDecision::Retry(_)
        ));
        assert_eq!(policy.on_rate_limited(Some(1), 1), RateLimitDecision::GiveUp);
        assert_eq!(policy.state(), BreakerState::Closed);
    }

    #[test]
    fn test_retries_of_one_message_count_once() {
        let mut policy = DeliveryPolicy::default();
        for _ in 0..4 {
            assert!(matches!(
                policy.on_rate_limited(Some(1), 0),
                RateLimitDecision::Retry(_)
            ));
            assert_eq!(policy.on_rate_limited(Some(1), 1), RateLimitDecision::GiveUp);
        }
        assert_eq!(policy.consecutive_rate_limits(), 4);
        assert_eq!(policy.state(), BreakerState::Closed);

        assert_eq!(policy.on_rate_limited(Some(1), 0), RateLimitDecision::Escalate);
    }

    #[test]
    fn test_opens_after_threshold_and_escalates_once() {
        let mut policy = DeliveryPolicy::default();
        for _ in 0..4 {
            assert_ne!(policy.on_rate_limited(Some(1), 0), RateLimitDecision::Escalate);
        }
        assert_eq!(policy.on_rate_limited(Some(1), 0), RateLimitDecision::Escalate);
        assert_eq!(policy.state(), BreakerState::Open);

        assert_eq!(policy.on_rate_limited(Some(1), 0), RateLimitDecision::Drop);
        assert_eq!(policy.on_rate_limited(Some(1), 0), RateLimitDecision::Drop);
        assert_eq!(policy.consecutive_rate_limits(), 7);
    }

    #[test]
    fn test_success_closes_and_resets() {
        let mut policy = DeliveryPolicy::new(DeliveryPolicyConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        policy.on_rate_limited(None, 0);
        assert_eq!(policy.on_rate_limited(None, 0), RateLimitDecision::Escalate);

        policy.on_success();
        assert_eq!(policy.state(), BreakerState::Closed);
        assert_eq!(policy.consecutive_rate_limits(), 0);
        assert!(matches!(
            policy.on_rate_limited(None, 0),
            RateLimitDecision::Retry(_)
        ));
    }
}
