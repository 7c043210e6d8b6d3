//! Token sources.
//!
//! A source performs one token acquisition for a given configuration.
//! Sources are stateless; caching and refresh live in the credential
//! agent layer.

pub mod client_assertion;
pub mod managed_identity;
pub mod workload_identity;

use cobalt_core::{AccessToken, Result};
use serde::{Deserialize, Serialize};

pub use client_assertion::ClientAssertionConfig;
pub use managed_identity::{IdentityProvider, ManagedIdentityConfig};
pub use workload_identity::WorkloadIdentityConfig;

/// The closed set of token-acquisition strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenSource {
    ClientAssertion(ClientAssertionConfig),
    ManagedIdentity(ManagedIdentityConfig),
    WorkloadIdentity(WorkloadIdentityConfig),
}

impl TokenSource {
    /// Source tag for logging and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenSource::ClientAssertion(_) => "client_assertion",
            TokenSource::ManagedIdentity(_) => "managed_identity",
            TokenSource::WorkloadIdentity(_) => "workload_identity",
        }
    }

    /// Perform one token acquisition.
    pub async fn fetch(&self, http: &reqwest::Client) -> Result<AccessToken> {
        match self {
            TokenSource::ClientAssertion(cfg) => client_assertion::fetch(http, cfg).await,
            TokenSource::ManagedIdentity(cfg) => managed_identity::fetch(http, cfg).await,
            TokenSource::WorkloadIdentity(cfg) => workload_identity::fetch(http, cfg).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_deserializes_by_tag() {
        let source: TokenSource = serde_json::from_str(
            r#"{
                "type": "managed_identity",
                "resource": "https://management.azure.com/"
            }"#,
        )
        .unwrap();
        assert_eq!(source.kind(), "managed_identity");
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = serde_json::from_str::<TokenSource>(r#"{"type": "device_code"}"#);
        assert!(err.is_err());
    }
}
