//! Request pipeline plugins.
//!
//! A plugin contributes a request hook (run in append order before
//! transmission) and a response hook (run in append order after). The
//! retry policy is special: the plugin only registers its options on
//! the request; the client dispatch loop enforces it, including on
//! transport errors.

pub mod apikey;
pub mod bearer;
pub mod error_handler;
pub mod headers;
pub mod request_id;
pub mod retry;
pub mod sas;
pub mod shared_key;

use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use cobalt_core::Result;

pub use apikey::ApiKey;
pub use bearer::BearerToken;
pub use error_handler::ErrorHandler;
pub use headers::AzureHeaders;
pub use request_id::RequestId;
pub use retry::{Retry, RetryPolicy};
pub use sas::SasToken;
pub use shared_key::SharedKey;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging.
    fn name(&self) -> &'static str;

    async fn on_request(&self, _req: &mut Request) -> Result<()> {
        Ok(())
    }

    async fn on_response(&self, _req: &Request, _resp: &mut Response) -> Result<()> {
        Ok(())
    }
}
