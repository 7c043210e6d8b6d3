//! Error types for Cobalt.

use std::fmt;
use thiserror::Error;

/// How a configuration value was wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    MissingRequired,
    InvalidValue,
    InvalidOption,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigErrorKind::MissingRequired => "missing required",
            ConfigErrorKind::InvalidValue => "invalid value",
            ConfigErrorKind::InvalidOption => "invalid option",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialErrorKind {
    InvalidKey,
    InvalidSignature,
    InvalidNamedKey,
}

impl fmt::Display for CredentialErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialErrorKind::InvalidKey => "invalid key",
            CredentialErrorKind::InvalidSignature => "invalid signature",
            CredentialErrorKind::InvalidNamedKey => "invalid named key",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FederationErrorKind {
    TokenFetchFailed,
    UnknownProvider,
}

impl fmt::Display for FederationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FederationErrorKind::TokenFetchFailed => "token fetch failed",
            FederationErrorKind::UnknownProvider => "unknown provider",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedIdentityErrorKind {
    ImdsUnavailable,
    IdentityNotFound,
    TokenFileNotFound,
    TokenFileReadError,
    EnvironmentNotDetected,
    ProviderError,
    InvalidResponse,
}

impl fmt::Display for ManagedIdentityErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagedIdentityErrorKind::ImdsUnavailable => "imds unavailable",
            ManagedIdentityErrorKind::IdentityNotFound => "identity not found",
            ManagedIdentityErrorKind::TokenFileNotFound => "token file not found",
            ManagedIdentityErrorKind::TokenFileReadError => "token file read error",
            ManagedIdentityErrorKind::EnvironmentNotDetected => "environment not detected",
            ManagedIdentityErrorKind::ProviderError => "provider error",
            ManagedIdentityErrorKind::InvalidResponse => "invalid response",
        };
        f.write_str(s)
    }
}

/// Azure AD STS failure classes, mapped from AADSTS codes and OAuth2
/// error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StsErrorKind {
    InvalidClient,
    InvalidScope,
    InvalidRequest,
    InvalidTenantId,
    InvalidJwt,
    FederationTrustMismatch,
    CertificateNotFound,
    AuthenticationFailed,
    Unknown,
}

impl fmt::Display for StsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StsErrorKind::InvalidClient => "invalid client",
            StsErrorKind::InvalidScope => "invalid scope",
            StsErrorKind::InvalidRequest => "invalid request",
            StsErrorKind::InvalidTenantId => "invalid tenant id",
            StsErrorKind::InvalidJwt => "invalid jwt",
            StsErrorKind::FederationTrustMismatch => "federation trust mismatch",
            StsErrorKind::CertificateNotFound => "certificate not found",
            StsErrorKind::AuthenticationFailed => "authentication failed",
            StsErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    FetchFailed,
    UnknownSourceType,
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentErrorKind::FetchFailed => "fetch failed",
            AgentErrorKind::UnknownSourceType => "unknown source type",
        };
        f.write_str(s)
    }
}

/// A normalized HTTP-level failure carrying the Azure correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: u16,
    pub error_code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
    pub url: Option<String>,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_code {
            Some(code) => write!(f, "HTTP {} [{}]: {}", self.status, code, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

impl std::error::Error for HttpError {}

#[derive(Debug, Error)]
pub enum Error {
    // Caller misconfiguration
    #[error("configuration error: {kind} for key `{key}`")]
    Config {
        kind: ConfigErrorKind,
        key: String,
        value: Option<String>,
    },

    #[error("credential error: {kind}")]
    Credential { kind: CredentialErrorKind },

    #[error("invalid token format: {detail}")]
    InvalidTokenFormat { detail: String },

    // Downstream services
    #[error("network error calling {service} at {endpoint}: {reason}")]
    Network {
        service: String,
        endpoint: String,
        reason: String,
    },

    #[error("{0}")]
    Http(HttpError),

    #[error("federation error ({kind}) from provider `{provider}`: {reason}")]
    Federation {
        kind: FederationErrorKind,
        provider: String,
        reason: String,
    },

    #[error("managed identity error ({kind}) from {provider}: {reason}")]
    ManagedIdentity {
        kind: ManagedIdentityErrorKind,
        provider: String,
        reason: String,
        status: Option<u16>,
    },

    // Authentication
    #[error("azure ad sts error ({kind}): {description}")]
    Sts {
        kind: StsErrorKind,
        error_code: Option<String>,
        description: String,
    },

    // Internal
    #[error("credential agent `{name}` {kind}: {reason}")]
    Agent {
        kind: AgentErrorKind,
        name: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn missing_required(key: impl Into<String>) -> Self {
        Error::Config {
            kind: ConfigErrorKind::MissingRequired,
            key: key.into(),
            value: None,
        }
    }

    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Error::Config {
            kind: ConfigErrorKind::InvalidValue,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn invalid_option(key: impl Into<String>, value: impl Into<String>) -> Self {
        Error::Config {
            kind: ConfigErrorKind::InvalidOption,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn network(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Network {
            service: service.into(),
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn agent_fetch_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Agent {
            kind: AgentErrorKind::FetchFailed,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for failures worth retrying at the transport layer.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network { .. } => true,
            Error::Http(e) => e.status == 429 || (500..=599).contains(&e.status),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        Error::Http(err)
    }
}
