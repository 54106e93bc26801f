//! Retry policies for the push connection.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ReconnectConfig, ReconnectKind};

/// Decides whether and when to retry after the link failed or dropped
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before retry number `attempt` (starting at 1), or `None` to
    /// give up
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Never retry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectPolicy for NoReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// `initial * 2^(attempt-1)`, capped at `max`, with optional jitter that
/// picks a delay between half and all of that value
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: Option<u32>,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            max_attempts: None,
            jitter: true,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.initial.saturating_mul(factor), self.max)
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return Some(base);
        }
        let millis = base.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Some(Duration::from_millis(jittered))
    }
}

pub fn from_config(config: &ReconnectConfig) -> Arc<dyn ReconnectPolicy> {
    match config.policy {
        ReconnectKind::None => Arc::new(NoReconnect),
        ReconnectKind::Exponential => {
            let mut policy = ExponentialBackoff::new(
                Duration::from_millis(config.initial_delay_ms),
                Duration::from_millis(config.max_delay_ms),
            );
            policy.max_attempts = config.max_attempts;
            Arc::new(policy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_reconnect_gives_up() {
        assert_eq!(NoReconnect.next_delay(1), None);
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5))
            .without_jitter();

        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_secs(5)));
        assert_eq!(policy.next_delay(40), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_backoff_respects_attempt_limit() {
        let policy = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1))
            .max_attempts(2);
        assert!(policy.next_delay(2).is_some());
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ExponentialBackoff::new(Duration::from_millis(400), Duration::from_secs(10));
        for _ in 0..50 {
            let delay = policy.next_delay(2).unwrap();
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(800));
        }
    }

    #[test]
    fn test_from_config() {
        let config = ReconnectConfig::default();
        assert_eq!(from_config(&config).next_delay(1), None);

        let config = ReconnectConfig {
            policy: ReconnectKind::Exponential,
            max_attempts: Some(1),
            ..ReconnectConfig::default()
        };
        let policy = from_config(&config);
        assert!(policy.next_delay(1).is_some());
        assert_eq!(policy.next_delay(2), None);
    }
}
