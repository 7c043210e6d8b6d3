//! AWS Cognito federated-token provider.

use super::{FederatedTokenProvider, ProviderOptions};
use async_trait::async_trait;
use cobalt_core::error::FederationErrorKind;
use cobalt_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const PROVIDER_NAME: &str = "aws_cognito";

/// Thin seam over the Cognito identity API so tests can substitute a
/// fake.
#[async_trait]
pub trait CognitoApi: Send + Sync {
    async fn get_open_id_token(&self, identity_id: &str) -> Result<String>;

    async fn get_open_id_token_for_developer_identity(
        &self,
        identity_id: &str,
        logins: HashMap<String, String>,
    ) -> Result<String>;
}

/// Production implementation backed by the AWS SDK. Credentials come
/// from the SDK's own default chain.
pub struct SdkCognito {
    client: aws_sdk_cognitoidentity::Client,
}

impl SdkCognito {
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_cognitoidentity::Client::new(&config),
        }
    }
}

fn token_fetch_failed(reason: impl Into<String>) -> Error {
    Error::Federation {
        kind: FederationErrorKind::TokenFetchFailed,
        provider: PROVIDER_NAME.to_string(),
        reason: reason.into(),
    }
}

#[async_trait]
impl CognitoApi for SdkCognito {
    async fn get_open_id_token(&self, identity_id: &str) -> Result<String> {
        let output = self
            .client
            .get_open_id_token()
            .identity_id(identity_id)
            .send()
            .await
            .map_err(|e| token_fetch_failed(e.to_string()))?;

        output
            .token()
            .map(str::to_string)
            .ok_or_else(|| token_fetch_failed("GetOpenIdToken response missing token"))
    }

    async fn get_open_id_token_for_developer_identity(
        &self,
        identity_id: &str,
        logins: HashMap<String, String>,
    ) -> Result<String> {
        let output = self
            .client
            .get_open_id_token_for_developer_identity()
            .identity_id(identity_id)
            .set_logins(Some(logins))
            .send()
            .await
            .map_err(|e| token_fetch_failed(e.to_string()))?;

        output.token().map(str::to_string).ok_or_else(|| {
            token_fetch_failed("GetOpenIdTokenForDeveloperIdentity response missing token")
        })
    }
}

/// Cognito provider with `basic` and `enhanced` auth modes.
pub struct CognitoProvider {
    api: Arc<dyn CognitoApi>,
}

impl CognitoProvider {
    pub fn new(api: Arc<dyn CognitoApi>) -> Self {
        Self { api }
    }

    pub async fn from_env() -> Self {
        Self::new(Arc::new(SdkCognito::from_env().await))
    }
}

#[async_trait]
impl FederatedTokenProvider for CognitoProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn assertion(&self, identity_id: &str, opts: &ProviderOptions) -> Result<String> {
        let auth_type = opts
            .get("auth_type")
            .and_then(|v| v.as_str())
            .unwrap_or("basic");

        debug!(identity_id = %identity_id, auth_type = %auth_type, "Fetching Cognito OpenID token");

        match auth_type {
            "basic" => self.api.get_open_id_token(identity_id).await,
            "enhanced" => {
                let logins = match opts.get("logins") {
                    None => return Err(Error::missing_required("logins")),
                    Some(serde_json::Value::String(s)) => parse_logins(s),
                    Some(serde_json::Value::Object(map)) => map
                        .iter()
                        .map(|(k, v)| {
                            let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                            (k.clone(), value)
                        })
                        .collect(),
                    Some(other) => {
                        return Err(Error::invalid_value("logins", other.to_string()));
                    }
                };
                self.api
                    .get_open_id_token_for_developer_identity(identity_id, logins)
                    .await
            }
            other => Err(Error::invalid_value("auth_type", other)),
        }
    }
}

/// Parse a `provider=token` comma-separated string into a login map.
/// Entries without a `=` are dropped silently.
pub fn parse_logins(input: &str) -> HashMap<String, String> {
    input
        .split(',')
        .filter_map(|entry| {
            let (provider, token) = entry.trim().split_once('=')?;
            Some((provider.trim().to_string(), token.trim().to_string()))
        })
        .collect()
}
