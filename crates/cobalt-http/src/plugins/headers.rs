//! Azure header conventions.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use chrono::Utc;
use cobalt_core::Result;

/// Adds `x-ms-version` (when an API version is configured), `x-ms-date`
/// in RFC 1123 GMT form, and `x-ms-return-client-request-id: true`.
pub struct AzureHeaders {
    api_version: Option<String>,
    include_date: bool,
}

impl AzureHeaders {
    pub fn new() -> Self {
        Self {
            api_version: None,
            include_date: true,
        }
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn include_date(mut self, include: bool) -> Self {
        self.include_date = include;
        self
    }
}

impl Default for AzureHeaders {
    fn default() -> Self {
        Self::new()
    }
}

fn rfc1123_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl Plugin for AzureHeaders {
    fn name(&self) -> &'static str {
        "azure_headers"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        if let Some(version) = &self.api_version {
            req.set_header("x-ms-version", version);
        }
        if self.include_date {
            req.set_header("x-ms-date", rfc1123_now());
        }
        req.set_header("x-ms-return-client-request-id", "true");
        Ok(())
    }
}
