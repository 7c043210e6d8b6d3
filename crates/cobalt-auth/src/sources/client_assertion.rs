//! Client-assertion token source: federation then OAuth2 JWT-bearer.

use crate::federation::{self, FederatedTokenProvider, ProviderOptions};
use crate::oauth2::{self, Cloud, ExchangeParams};
use cobalt_core::{AccessToken, Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAssertionConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub scope: String,
    /// Federated-token provider tag, e.g. `aws_cognito`.
    pub provider: String,
    #[serde(default)]
    pub provider_opts: ProviderOptions,
    #[serde(default)]
    pub cloud: Cloud,
}

impl ClientAssertionConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("scope", &self.scope),
            ("provider", &self.provider),
        ] {
            if value.is_empty() {
                return Err(Error::missing_required(key));
            }
        }
        Ok(())
    }
}

/// Fetch a token: obtain the external assertion, then exchange it.
/// Errors from either step propagate unchanged.
pub async fn fetch(http: &reqwest::Client, cfg: &ClientAssertionConfig) -> Result<AccessToken> {
    cfg.validate()?;
    let provider = federation::resolve(&cfg.provider).await?;
    fetch_with_provider(http, cfg, provider.as_ref()).await
}

/// Fetch with an already-resolved federation provider.
pub async fn fetch_with_provider(
    http: &reqwest::Client,
    cfg: &ClientAssertionConfig,
    provider: &dyn FederatedTokenProvider,
) -> Result<AccessToken> {
    cfg.validate()?;
    let assertion = federation::fetch_assertion_with(provider, &cfg.provider_opts).await?;
    oauth2::exchange(
        http,
        &ExchangeParams {
            tenant_id: cfg.tenant_id.clone(),
            client_id: cfg.client_id.clone(),
            assertion,
            scope: cfg.scope.clone(),
            cloud: cfg.cloud.clone(),
            timeout: None,
        },
    )
    .await
}
