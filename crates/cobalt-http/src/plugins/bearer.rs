//! Bearer-token authentication.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use cobalt_agent::Registry;
use cobalt_core::Result;
use tracing::warn;

/// Adds `Authorization: Bearer <token>`, either from a static token or
/// by resolving a named credential through the registry. A resolution
/// failure leaves the header absent and records the reason in the
/// request options (`bearer_token_error`), so the server answers 401
/// instead of the pipeline failing.
pub struct BearerToken {
    token: Option<String>,
    credential: Option<(String, Registry)>,
}

impl BearerToken {
    /// Static token; takes precedence over a configured credential.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            credential: None,
        }
    }

    /// Resolve the named credential on every request.
    pub fn with_credential(name: impl Into<String>, registry: Registry) -> Self {
        Self {
            token: None,
            credential: Some((name.into(), registry)),
        }
    }
}

#[async_trait]
impl Plugin for BearerToken {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        if let Some(token) = &self.token {
            req.set_header("authorization", format!("Bearer {token}"));
            return Ok(());
        }
        if let Some((name, registry)) = &self.credential {
            match registry.fetch(name).await {
                Ok(token) => {
                    req.set_header("authorization", format!("Bearer {}", token.access_token));
                }
                Err(e) => {
                    warn!(credential = %name, error = %e, "Bearer token resolution failed");
                    req.options.insert("bearer_token_error", e.to_string());
                }
            }
        }
        Ok(())
    }
}
