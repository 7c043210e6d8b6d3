//! Federated-token providers.
//!
//! A provider turns an external identity into a signed assertion that
//! the OAuth2 exchanger can present to Azure AD.

pub mod cognito;

use async_trait::async_trait;
use cobalt_core::error::FederationErrorKind;
use cobalt_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub use cognito::{CognitoApi, CognitoProvider};

/// Free-form options forwarded to the selected provider.
pub type ProviderOptions = HashMap<String, serde_json::Value>;

/// A source of external-identity assertions.
#[async_trait]
pub trait FederatedTokenProvider: Send + Sync {
    /// Provider tag for dispatch and logging.
    fn name(&self) -> &'static str;

    /// Obtain one assertion for the given identity.
    async fn assertion(&self, identity_id: &str, opts: &ProviderOptions) -> Result<String>;
}

/// Resolve a provider tag to an implementation.
pub async fn resolve(tag: &str) -> Result<Arc<dyn FederatedTokenProvider>> {
    match tag {
        "aws_cognito" => Ok(Arc::new(CognitoProvider::from_env().await)),
        other => Err(Error::Federation {
            kind: FederationErrorKind::UnknownProvider,
            provider: other.to_string(),
            reason: "no such federated token provider".to_string(),
        }),
    }
}

/// Dispatch one assertion fetch: pick the provider by tag, pull
/// `identity_id` out of the options, and forward the rest.
pub async fn fetch_assertion(tag: &str, opts: &ProviderOptions) -> Result<String> {
    let provider = resolve(tag).await?;
    fetch_assertion_with(provider.as_ref(), opts).await
}

/// Same as [`fetch_assertion`] with an already-resolved provider.
pub async fn fetch_assertion_with(
    provider: &dyn FederatedTokenProvider,
    opts: &ProviderOptions,
) -> Result<String> {
    let identity_id = opts
        .get("identity_id")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    provider.assertion(identity_id, opts).await
}
