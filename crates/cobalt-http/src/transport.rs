//! Transport seam: the pipeline hands a fully resolved request to an
//! injected transport and gets raw status/headers/body back. Tests
//! substitute a scripted implementation.

use crate::request::Method;
use async_trait::async_trait;
use cobalt_core::{Error, Result};
use futures::Stream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

/// A fully resolved request ready for transmission.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// Untouched response parts.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Response with a streaming body.
pub struct StreamingResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub stream: ByteStream,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse>;

    /// Streaming send; the default buffers through [`send`](Self::send).
    async fn send_stream(&self, request: TransportRequest) -> Result<StreamingResponse> {
        let response = self.send(request).await?;
        Ok(StreamingResponse {
            status: response.status,
            headers: response.headers,
            stream: Box::pin(futures::stream::once(async move { Ok(response.body) })),
        })
    }
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &TransportRequest) -> reqwest::RequestBuilder {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

fn network_error(url: &str, e: &reqwest::Error) -> Error {
    Error::network("http", url, e.to_string())
}

fn header_pairs(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let url = request.url.clone();
        let response = self
            .build(&request)
            .send()
            .await
            .map_err(|e| network_error(&url, &e))?;

        let status = response.status().as_u16();
        let headers = header_pairs(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(&url, &e))?
            .to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: TransportRequest) -> Result<StreamingResponse> {
        let url = request.url.clone();
        let response = self
            .build(&request)
            .send()
            .await
            .map_err(|e| network_error(&url, &e))?;

        let status = response.status().as_u16();
        let headers = header_pairs(&response);
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| network_error(&url, &e))
            })
            .boxed();

        Ok(StreamingResponse {
            status,
            headers,
            stream,
        })
    }
}
