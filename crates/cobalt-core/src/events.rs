//! Telemetry events emitted by the credential and request layers.
//!
//! Events carry metadata only; token material never appears in a
//! payload. Sinks beyond `tracing` are the embedding application's
//! concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// All events emitted by Cobalt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    // Token lifecycle
    TokenAcquired(TokenAcquiredPayload),
    TokenRefreshScheduled(TokenRefreshScheduledPayload),
    TokenRefreshFailed(TokenRefreshFailedPayload),
    TokenRefreshExhausted(TokenRefreshExhaustedPayload),

    // Request pipeline
    RequestRetried(RequestRetriedPayload),
    RequestFailed(RequestFailedPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAcquiredPayload {
    pub credential: String,
    pub expires_at: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshScheduledPayload {
    pub credential: String,
    pub delay_secs: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshFailedPayload {
    pub credential: String,
    pub attempt: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshExhaustedPayload {
    pub credential: String,
    pub attempts: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRetriedPayload {
    pub method: String,
    pub url: String,
    pub attempt: u32,
    pub status: Option<u16>,
    pub delay_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFailedPayload {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AuthEvent {
    /// Stable event name for sinks keyed by event type.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::TokenAcquired(_) => "token.acquired",
            AuthEvent::TokenRefreshScheduled(_) => "token.refresh_scheduled",
            AuthEvent::TokenRefreshFailed(_) => "token.refresh_failed",
            AuthEvent::TokenRefreshExhausted(_) => "token.refresh_exhausted",
            AuthEvent::RequestRetried(_) => "request.retried",
            AuthEvent::RequestFailed(_) => "request.failed",
        }
    }

    /// Log the event through `tracing` with structured fields.
    pub fn emit(&self) {
        match self {
            AuthEvent::TokenAcquired(p) => {
                info!(
                    event = self.name(),
                    credential = %p.credential,
                    expires_at = p.expires_at,
                    "Token acquired"
                );
            }
            AuthEvent::TokenRefreshScheduled(p) => {
                debug!(
                    event = self.name(),
                    credential = %p.credential,
                    delay_secs = p.delay_secs,
                    "Token refresh scheduled"
                );
            }
            AuthEvent::TokenRefreshFailed(p) => {
                warn!(
                    event = self.name(),
                    credential = %p.credential,
                    attempt = p.attempt,
                    reason = %p.reason,
                    "Token refresh failed"
                );
            }
            AuthEvent::TokenRefreshExhausted(p) => {
                error!(
                    event = self.name(),
                    credential = %p.credential,
                    attempts = p.attempts,
                    reason = %p.reason,
                    "Token refresh retries exhausted"
                );
            }
            AuthEvent::RequestRetried(p) => {
                debug!(
                    event = self.name(),
                    method = %p.method,
                    url = %p.url,
                    attempt = p.attempt,
                    status = ?p.status,
                    delay_ms = p.delay_ms,
                    "Retrying request"
                );
            }
            AuthEvent::RequestFailed(p) => {
                warn!(
                    event = self.name(),
                    method = %p.method,
                    url = %p.url,
                    status = ?p.status,
                    reason = %p.reason,
                    "Request failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = AuthEvent::TokenAcquired(TokenAcquiredPayload {
            credential: "storage".to_string(),
            expires_at: 0,
            timestamp: Utc::now(),
        });
        assert_eq!(event.name(), "token.acquired");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = AuthEvent::TokenRefreshFailed(TokenRefreshFailedPayload {
            credential: "storage".to_string(),
            attempt: 2,
            reason: "timeout".to_string(),
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "token_refresh_failed");
        assert_eq!(json["attempt"], 2);
    }
}
