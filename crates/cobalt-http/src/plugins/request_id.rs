//! Client request-id propagation.

use super::Plugin;
use crate::request::Request;
use async_trait::async_trait;
use cobalt_core::Result;
use uuid::Uuid;

/// Sets `x-ms-client-request-id` to a lowercase v4 UUID. An explicit
/// `request_id` option on the request overrides the generated value.
pub struct RequestId;

impl RequestId {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for RequestId {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn on_request(&self, req: &mut Request) -> Result<()> {
        let id = match req.options.get_str("request_id") {
            Some(explicit) => explicit.to_ascii_lowercase(),
            None => Uuid::new_v4().to_string(),
        };
        req.set_header("x-ms-client-request-id", id);
        Ok(())
    }
}
