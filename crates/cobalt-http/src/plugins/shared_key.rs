//! Azure Storage Shared Key signing.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cobalt_core::error::CredentialErrorKind;
use cobalt_core::{Error, NamedKeyCredential, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs requests with `Authorization: SharedKey <account>:<signature>`,
/// where the signature is HMAC-SHA256 over the canonical string with the
/// base64-decoded account key.
pub struct SharedKey {
    account: String,
    key: String,
}

impl SharedKey {
    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account: account_name.into(),
            key: account_key.into(),
        }
    }
}

impl From<&NamedKeyCredential> for SharedKey {
    fn from(credential: &NamedKeyCredential) -> Self {
        Self::new(credential.name(), credential.key())
    }
}

#[async_trait]
impl Plugin for SharedKey {
    fn name(&self) -> &'static str {
        "shared_key"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        let canonical = string_to_sign(req, &self.account)?;

        let key_bytes = BASE64.decode(&self.key).map_err(|_| Error::Credential {
            kind: CredentialErrorKind::InvalidNamedKey,
        })?;
        let mut mac = HmacSha256::new_from_slice(&key_bytes).map_err(|_| Error::Credential {
            kind: CredentialErrorKind::InvalidNamedKey,
        })?;
        mac.update(canonical.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        req.set_header(
            "authorization",
            format!("SharedKey {}:{signature}", self.account),
        );
        Ok(())
    }
}

/// Canonical string-to-sign: the eleven standard headers after the
/// upper-case verb, then the sorted `x-ms-*` headers, then the
/// canonicalized resource.
fn string_to_sign(req: &Request, account: &str) -> Result<String> {
    let header = |name: &str| {
        req.headers
            .get(name)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let content_length = match req.headers.get("content-length") {
        Some(explicit) => explicit.trim().to_string(),
        None => req
            .body
            .to_bytes()?
            .map(|b| b.len().to_string())
            .unwrap_or_default(),
    };

    let mut lines = vec![
        req.method.as_str().to_string(),
        header("content-encoding"),
        header("content-language"),
        content_length,
        header("content-md5"),
        header("content-type"),
        header("date"),
        header("if-modified-since"),
        header("if-match"),
        header("if-none-match"),
        header("if-unmodified-since"),
        header("range"),
    ];

    // Headers are stored in a sorted map with lowercase names, which is
    // exactly the canonical order.
    for (name, value) in &req.headers {
        if name.starts_with("x-ms-") {
            lines.push(format!("{name}:{}", value.trim()));
        }
    }

    let (path, url_pairs) = req.split_url();
    lines.push(format!("/{account}{path}"));

    let mut pairs: Vec<(String, String)> = url_pairs
        .into_iter()
        .chain(req.query.iter().map(|(k, v)| (k.clone(), v.clone())))
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect();
    pairs.sort();
    for (name, value) in pairs {
        lines.push(format!("{name}:{value}"));
    }

    Ok(lines.join("\n"))
}
