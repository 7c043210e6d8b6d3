//! Cobalt Auth
//!
//! Token acquisition for Azure AD: the OAuth2 JWT-bearer exchanger,
//! federated-token providers, and the token sources that tie them
//! together (client assertion, managed identity, workload identity).

pub mod federation;
pub mod oauth2;
pub mod sources;

pub use federation::{CognitoApi, CognitoProvider, FederatedTokenProvider, ProviderOptions};
pub use oauth2::{Cloud, ExchangeParams};
pub use sources::{
    ClientAssertionConfig, IdentityProvider, ManagedIdentityConfig, TokenSource,
    WorkloadIdentityConfig,
};
