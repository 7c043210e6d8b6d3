//! Transient-failure retry policy.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use cobalt_core::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

pub(crate) const RETRY_OPTION: &str = "retry";

/// Retry policy enforced by the client dispatch loop. The plugin only
/// registers the policy on the request; the loop applies it to both
/// retryable statuses and transport errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retry_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 32000,
            retry_statuses: BTreeSet::from([408, 429, 500, 502, 503, 504]),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before the next attempt. A parseable `Retry-After` wins;
    /// otherwise exponential backoff with up to 20% jitter, capped at
    /// `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs);
        }
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let jitter = rand::thread_rng().gen_range(0..=exp / 5);
        Duration::from_millis(exp.saturating_add(jitter).min(self.max_delay_ms))
    }
}

pub struct Retry {
    policy: RetryPolicy,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.policy.base_delay_ms = ms;
        self
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl Plugin for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        req.options
            .insert(RETRY_OPTION, serde_json::to_value(&self.policy)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert!(policy.is_retryable(429));
        assert!(policy.is_retryable(503));
        assert!(!policy.is_retryable(404));
    }

    #[test]
    fn test_retry_after_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, Some(7)), Duration::from_secs(7));
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..6 {
            let delay = policy.delay_for(attempt, None).as_millis() as u64;
            let exp = 1000u64 << attempt;
            assert!(delay >= exp.min(policy.max_delay_ms), "attempt {attempt}: {delay}");
            assert!(delay <= (exp + exp / 5).min(policy.max_delay_ms));
        }
        // Far past the cap.
        assert_eq!(
            policy.delay_for(30, None),
            Duration::from_millis(policy.max_delay_ms)
        );
    }

    #[tokio::test]
    async fn test_plugin_registers_policy_option() {
        let plugin = Retry::default().max_retries(5);
        let mut req = Request::get("https://example.com");
        plugin.on_request(&mut req).await.unwrap();

        let registered: RetryPolicy =
            serde_json::from_value(req.options.get(RETRY_OPTION).unwrap().clone()).unwrap();
        assert_eq!(registered.max_retries, 5);
    }
}
