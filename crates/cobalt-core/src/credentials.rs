//! Static (non-token) credential values.

use crate::error::{CredentialErrorKind, Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An API key for header-based authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    key: String,
}

impl ApiKeyCredential {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::Credential {
                kind: CredentialErrorKind::InvalidKey,
            });
        }
        Ok(Self { key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a new credential with the replacement key.
    pub fn update(&self, key: impl Into<String>) -> Result<Self> {
        Self::new(key)
    }
}

impl fmt::Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredential").field("key", &"***").finish()
    }
}

/// A shared access signature. The stored signature never carries a
/// leading `?`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SasCredential {
    signature: String,
}

impl SasCredential {
    pub fn new(signature: impl Into<String>) -> Result<Self> {
        let mut signature = signature.into().trim().to_string();
        while let Some(rest) = signature.strip_prefix('?') {
            signature = rest.trim_start().to_string();
        }
        if signature.is_empty() {
            return Err(Error::Credential {
                kind: CredentialErrorKind::InvalidSignature,
            });
        }
        Ok(Self { signature })
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn update(&self, signature: impl Into<String>) -> Result<Self> {
        Self::new(signature)
    }
}

impl fmt::Debug for SasCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasCredential")
            .field("signature", &"***")
            .finish()
    }
}

/// Account name plus base64-encoded account key, as used by the Azure
/// Storage shared key scheme.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedKeyCredential {
    name: String,
    key: String,
}

impl NamedKeyCredential {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let key = key.into();
        if name.is_empty() || key.is_empty() || BASE64.decode(&key).is_err() {
            return Err(Error::Credential {
                kind: CredentialErrorKind::InvalidNamedKey,
            });
        }
        Ok(Self { name, key })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Decoded raw key bytes.
    pub fn key_bytes(&self) -> Vec<u8> {
        // Validated at construction.
        BASE64.decode(&self.key).unwrap_or_default()
    }

    pub fn update(&self, name: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        Self::new(name, key)
    }
}

impl fmt::Debug for NamedKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedKeyCredential")
            .field("name", &self.name)
            .field("key", &"***")
            .finish()
    }
}
