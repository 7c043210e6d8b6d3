//! API-key header authentication.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use cobalt_core::{ApiKeyCredential, Result};
use tracing::warn;

const DEFAULT_HEADER: &str = "api-key";

/// Adds the API key under a configurable header name, optionally with a
/// prefix (`"<prefix> <key>"`). An empty or unset key records
/// `api_key_error` in the request options and omits the header.
pub struct ApiKey {
    key: Option<String>,
    header_name: String,
    prefix: Option<String>,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            header_name: DEFAULT_HEADER.to_string(),
            prefix: None,
        }
    }

    /// No key configured; the plugin records the error at request time.
    pub fn unset() -> Self {
        Self {
            key: None,
            header_name: DEFAULT_HEADER.to_string(),
            prefix: None,
        }
    }

    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into().to_ascii_lowercase();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl From<&ApiKeyCredential> for ApiKey {
    fn from(credential: &ApiKeyCredential) -> Self {
        Self::new(credential.key())
    }
}

#[async_trait]
impl Plugin for ApiKey {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        match self.key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let value = match &self.prefix {
                    Some(prefix) => format!("{prefix} {key}"),
                    None => key.to_string(),
                };
                req.set_header(&self.header_name, value);
            }
            None => {
                warn!("API key is empty or unset, omitting header");
                req.options.insert("api_key_error", "api key is empty or unset");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_default_header_name() {
        let plugin = ApiKey::new("secret");
        let mut req = Request::get("https://example.com");
        plugin.on_request(&mut req).await.unwrap();
        assert_eq!(req.header_value("api-key"), Some("secret"));
    }

    #[tokio::test]
    async fn test_custom_header_and_prefix() {
        let plugin = ApiKey::new("secret")
            .header_name("Ocp-Apim-Subscription-Key")
            .prefix("SharedAccessKey");
        let mut req = Request::get("https://example.com");
        plugin.on_request(&mut req).await.unwrap();
        assert_eq!(
            req.header_value("ocp-apim-subscription-key"),
            Some("SharedAccessKey secret")
        );
    }

    #[tokio::test]
    async fn test_empty_key_records_error() {
        let plugin = ApiKey::new("");
        let mut req = Request::get("https://example.com");
        plugin.on_request(&mut req).await.unwrap();
        assert_eq!(req.header_value("api-key"), None);
        assert!(req.options.get_str("api_key_error").is_some());
    }

    #[tokio::test]
    async fn test_from_credential() {
        let credential = ApiKeyCredential::new("from-cred").unwrap();
        let plugin = ApiKey::from(&credential);
        let mut req = Request::get("https://example.com");
        plugin.on_request(&mut req).await.unwrap();
        assert_eq!(req.header_value("api-key"), Some("from-cred"));
    }
}
