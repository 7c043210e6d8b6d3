//! Access token record.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative expiry as reported by the token endpoint.
///
/// Azure AD normally returns an integer number of seconds, but some
/// gateways hand back the value as a string. The raw form is kept
/// verbatim; `expires_at` is always the authoritative field.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiresIn {
    Seconds(i64),
    Raw(String),
}

impl ExpiresIn {
    /// Numeric view, if the value parses as seconds.
    pub fn as_seconds(&self) -> Option<i64> {
        match self {
            ExpiresIn::Seconds(s) => Some(*s),
            ExpiresIn::Raw(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Debug for ExpiresIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiresIn::Seconds(s) => write!(f, "{s}"),
            ExpiresIn::Raw(s) => write!(f, "{s:?}"),
        }
    }
}

/// An Azure AD access token with absolute expiry.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub scope: Option<String>,
    /// Unix seconds; authoritative over `expires_in`.
    pub expires_at: i64,
    pub expires_in: ExpiresIn,
}

impl AccessToken {
    /// Build a token record, enforcing the non-empty / non-negative
    /// invariants.
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        scope: Option<String>,
        expires_at: i64,
        expires_in: ExpiresIn,
    ) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return Err(Error::InvalidTokenFormat {
                detail: "access_token is empty".to_string(),
            });
        }
        if expires_at < 0 {
            return Err(Error::InvalidTokenFormat {
                detail: format!("expires_at is negative: {expires_at}"),
            });
        }
        Ok(Self {
            access_token,
            token_type: token_type.into(),
            scope,
            expires_at,
            expires_in,
        })
    }

    /// Seconds until expiry (negative if already expired).
    pub fn remaining_secs(&self) -> i64 {
        self.expires_at - Utc::now().timestamp()
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs() <= 0
    }

    /// Whether the token expires within the next `secs` seconds.
    pub fn expires_within(&self, secs: i64) -> bool {
        self.remaining_secs() <= secs
    }

    /// Seconds until a proactive refresh should run, never negative.
    pub fn refresh_in_secs(&self, refresh_before: i64) -> u64 {
        (self.expires_at - Utc::now().timestamp() - refresh_before).max(0) as u64
    }
}

// The token value is a secret; keep it out of logs and debug dumps.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
