//! Shared-access-signature query authentication.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use cobalt_core::{Result, SasCredential};

/// Appends a SAS token to the request URL's query string.
pub struct SasToken {
    token: String,
}

impl SasToken {
    pub fn new(token: impl Into<String>) -> Self {
        let mut token = token.into().trim().to_string();
        while let Some(rest) = token.strip_prefix('?') {
            token = rest.trim_start().to_string();
        }
        Self { token }
    }
}

impl From<&SasCredential> for SasToken {
    fn from(credential: &SasCredential) -> Self {
        Self::new(credential.signature())
    }
}

#[async_trait]
impl Plugin for SasToken {
    fn name(&self) -> &'static str {
        "sas_token"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        if self.token.is_empty() {
            return Ok(());
        }
        let separator = if req.url.contains('?') { '&' } else { '?' };
        req.url = format!("{}{}{}", req.url, separator, self.token);
        Ok(())
    }
}
