//! Cobalt HTTP
//!
//! The authenticated request pipeline: a request model with lowercased
//! headers and a plugin-local options bag, an ordered plugin chain
//! (auth, Azure headers, request ids, retry, error normalization), and
//! a client that dispatches through an injected transport with
//! streaming download modes.

pub mod client;
pub mod plugins;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{Client, ClientConfig, DownloadStream, FoldStep, StreamEvent};
pub use plugins::{
    ApiKey, AzureHeaders, BearerToken, ErrorHandler, Plugin, RequestId, Retry, RetryPolicy,
    SasToken, SharedKey,
};
pub use request::{Body, Method, Options, Request};
pub use response::{Response, ResponseBody};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportRequest};
