//! Credential agent configuration.

use cobalt_auth::TokenSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the first acquisition behaves at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prefetch {
    /// Block agent startup until the first acquisition completes. A
    /// failed acquisition does not prevent startup; it schedules an
    /// immediate retry.
    #[default]
    Sync,
    /// Return immediately and queue the first acquisition.
    Async,
}

/// Delay schedule for refresh retries, as a function of the current
/// consecutive-failure count.
#[derive(Clone)]
pub struct RetryDelay(Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl RetryDelay {
    pub fn new(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }
}

impl Default for RetryDelay {
    /// `min(30, 2^attempt)` seconds.
    fn default() -> Self {
        Self::new(|attempt| Duration::from_secs((1u64 << attempt.min(5)).min(30)))
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryDelay(..)")
    }
}

/// Configuration for one credential agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique credential name.
    pub name: String,
    pub source: TokenSource,
    /// Seconds before expiry at which a proactive refresh runs.
    #[serde(default = "default_refresh_before")]
    pub refresh_before: i64,
    /// Consecutive failures tolerated before dropping to the backoff
    /// floor.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub prefetch: Prefetch,
    #[serde(skip, default)]
    pub retry_delay: RetryDelay,
}

fn default_refresh_before() -> i64 {
    300
}

fn default_max_retries() -> u32 {
    10
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, source: TokenSource) -> Self {
        Self {
            name: name.into(),
            source,
            refresh_before: default_refresh_before(),
            max_retries: default_max_retries(),
            prefetch: Prefetch::default(),
            retry_delay: RetryDelay::default(),
        }
    }

    /// Parse a supervisor-provided config map, surfacing bad input as
    /// typed errors instead of raw deserialization failures.
    pub fn from_json(value: serde_json::Value) -> cobalt_core::Result<Self> {
        use cobalt_core::Error;
        use cobalt_core::error::AgentErrorKind;

        let name = value
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            return Err(Error::missing_required("name"));
        }

        if let Some(prefetch) = value.get("prefetch") {
            if !matches!(prefetch.as_str(), Some("sync") | Some("async")) {
                return Err(Error::invalid_option("prefetch", prefetch.to_string()));
            }
        }

        let source_type = value
            .pointer("/source/type")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !matches!(
            source_type,
            "client_assertion" | "managed_identity" | "workload_identity"
        ) {
            return Err(Error::Agent {
                kind: AgentErrorKind::UnknownSourceType,
                name,
                reason: format!("unknown source type `{source_type}`"),
            });
        }

        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_retry_delay_schedule() {
        let delay = RetryDelay::default();
        assert_eq!(delay.delay(0), Duration::from_secs(1));
        assert_eq!(delay.delay(1), Duration::from_secs(2));
        assert_eq!(delay.delay(4), Duration::from_secs(16));
        // Capped at the 30-second floor from attempt 5 on.
        assert_eq!(delay.delay(5), Duration::from_secs(30));
        assert_eq!(delay.delay(12), Duration::from_secs(30));
    }

    #[test]
    fn test_config_defaults_from_serde() {
        let cfg: AgentConfig = serde_json::from_str(
            r#"{
                "name": "storage",
                "source": {"type": "managed_identity", "resource": "https://storage.azure.com/"}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.refresh_before, 300);
        assert_eq!(cfg.max_retries, 10);
        assert_eq!(cfg.prefetch, Prefetch::Sync);
    }

    #[test]
    fn test_invalid_prefetch_rejected() {
        let err = AgentConfig::from_json(serde_json::json!({
            "name": "storage",
            "source": {"type": "managed_identity", "resource": "r"},
            "prefetch": "lazy",
        }))
        .unwrap_err();
        match err {
            cobalt_core::Error::Config { kind, key, .. } => {
                assert_eq!(kind, cobalt_core::error::ConfigErrorKind::InvalidOption);
                assert_eq!(key, "prefetch");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_source_type_rejected() {
        let err = AgentConfig::from_json(serde_json::json!({
            "name": "storage",
            "source": {"type": "device_code"},
        }))
        .unwrap_err();
        match err {
            cobalt_core::Error::Agent { kind, name, .. } => {
                assert_eq!(kind, cobalt_core::error::AgentErrorKind::UnknownSourceType);
                assert_eq!(name, "storage");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = AgentConfig::from_json(serde_json::json!({
            "source": {"type": "managed_identity", "resource": "r"},
        }))
        .unwrap_err();
        assert!(matches!(err, cobalt_core::Error::Config { .. }));
    }
}
