//! HTTP client: plugin dispatch, retry enforcement, streaming modes.

use crate::plugins::Plugin;
use crate::plugins::error_handler::canned_message;
use crate::plugins::retry::{RETRY_OPTION, RetryPolicy};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{ByteStream, ReqwestTransport, StreamingResponse, Transport, TransportRequest};
use chrono::Utc;
use cobalt_core::events::{AuthEvent, RequestRetriedPayload};
use cobalt_core::{Error, HttpError, Result};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    /// Receive timeout for the whole request.
    pub timeout: Duration,
    pub pool_idle_timeout: Option<Duration>,
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            pool_idle_timeout: None,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }
}

/// A client binds a transport, default headers, and an ordered plugin
/// list. Request hooks run in append order before transmission,
/// response hooks in append order after.
pub struct Client {
    config: ClientConfig,
    plugins: Vec<Arc<dyn Plugin>>,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(idle) = config.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Other(format!("failed to build http client: {e}")))?;
        Ok(Self::with_transport(
            config,
            Arc::new(ReqwestTransport::new(client)),
        ))
    }

    /// Inject a transport; tests substitute a scripted one.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            plugins: Vec::new(),
            transport,
        }
    }

    /// Append a plugin to the chain.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Dispatch a request through the plugin chain and transport.
    pub async fn request(&self, mut req: Request) -> Result<Response> {
        self.prepare(&mut req).await?;
        let policy = retry_policy(&req);
        let transport_req = self.to_transport(&req)?;
        let mut response = self.dispatch(transport_req, policy.as_ref()).await?;
        for plugin in &self.plugins {
            plugin.on_response(&req, &mut response).await?;
        }
        Ok(response)
    }

    async fn prepare(&self, req: &mut Request) -> Result<()> {
        for (name, value) in &self.config.default_headers {
            req.headers
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| value.clone());
        }
        for plugin in &self.plugins {
            plugin.on_request(req).await?;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        request: TransportRequest,
        policy: Option<&RetryPolicy>,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            match self.transport.send(request.clone()).await {
                Ok(raw) => {
                    let response = Response::from_parts(raw.status, raw.headers, raw.body);
                    if let Some(policy) = policy {
                        if policy.is_retryable(response.status) && attempt < policy.max_retries {
                            let retry_after = response
                                .header("retry-after")
                                .and_then(|v| v.trim().parse().ok());
                            let delay = policy.delay_for(attempt, retry_after);
                            self.note_retry(&request, attempt, Some(response.status), &delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if let Some(policy) = policy {
                        if attempt < policy.max_retries {
                            let delay = policy.delay_for(attempt, None);
                            self.note_retry(&request, attempt, None, &delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }
                    return Err(e);
                }
            }
        }
    }

    fn note_retry(
        &self,
        request: &TransportRequest,
        attempt: u32,
        status: Option<u16>,
        delay: &Duration,
    ) {
        AuthEvent::RequestRetried(RequestRetriedPayload {
            method: request.method.to_string(),
            url: request.url.clone(),
            attempt,
            status,
            delay_ms: delay.as_millis() as u64,
            timestamp: Utc::now(),
        })
        .emit();
    }

    fn to_transport(&self, req: &Request) -> Result<TransportRequest> {
        let url = self.resolve_url(req);
        let mut headers = req.headers.clone();
        if let Some(content_type) = req.body.content_type() {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| content_type.to_string());
        }
        Ok(TransportRequest {
            method: req.method,
            url,
            headers,
            body: req.body.to_bytes()?,
            timeout: None,
        })
    }

    fn resolve_url(&self, req: &Request) -> String {
        let mut url = if req.url.starts_with("http://") || req.url.starts_with("https://") {
            req.url.clone()
        } else {
            match &self.config.base_url {
                Some(base) => format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    req.url.trim_start_matches('/')
                ),
                None => req.url.clone(),
            }
        };
        if !req.query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(req.query.iter())
                .finish();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&encoded);
        }
        url
    }
}

fn retry_policy(req: &Request) -> Option<RetryPolicy> {
    req.options
        .get(RETRY_OPTION)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

// --- Streaming ---

/// Messages delivered by [`Client::download_channel`].
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(Vec<u8>),
    Done,
    Error(String),
}

/// A channel-backed download, tagged with a unique stream id.
pub struct DownloadStream {
    pub id: String,
    pub rx: mpsc::Receiver<StreamEvent>,
}

/// Reducer outcome for [`Client::download_fold`].
pub enum FoldStep<T> {
    Continue(T),
    Halt(T),
}

impl Client {
    async fn open_stream(&self, mut req: Request) -> Result<StreamingResponse> {
        self.prepare(&mut req).await?;
        let transport_req = self.to_transport(&req)?;
        let streaming = self.transport.send_stream(transport_req).await?;
        if streaming.status >= 400 {
            let request_id = streaming
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("x-ms-request-id"))
                .map(|(_, value)| value.clone());
            return Err(Error::Http(HttpError {
                status: streaming.status,
                error_code: None,
                message: canned_message(streaming.status).to_string(),
                request_id,
                url: Some(req.url.clone()),
            }));
        }
        Ok(streaming)
    }

    /// Stream the response body into a file. The write is atomic: the
    /// body lands in a temporary sibling first, and a partial file is
    /// removed on failure.
    pub async fn download_to_file(&self, req: Request, path: &Path) -> Result<u64> {
        let streaming = self.open_stream(req).await?;
        let tmp = path.with_extension(format!("part-{}", Uuid::new_v4()));

        match write_stream_to(&tmp, streaming.stream).await {
            Ok(written) => {
                if let Err(e) = tokio::fs::rename(&tmp, path).await {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(e.into());
                }
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    /// Fold the response body through a reducer. Returning
    /// [`FoldStep::Halt`] stops consumption early.
    pub async fn download_fold<T, F>(&self, req: Request, init: T, mut f: F) -> Result<T>
    where
        T: Send,
        F: FnMut(Vec<u8>, T) -> FoldStep<T> + Send,
    {
        let mut streaming = self.open_stream(req).await?;
        let mut acc = init;
        while let Some(chunk) = streaming.stream.next().await {
            match f(chunk?, acc) {
                FoldStep::Continue(next) => acc = next,
                FoldStep::Halt(done) => return Ok(done),
            }
        }
        Ok(acc)
    }

    /// Deliver the response body as messages on a channel: zero or more
    /// chunks followed by a terminal `Done` or `Error`.
    pub async fn download_channel(&self, req: Request) -> Result<DownloadStream> {
        let mut streaming = self.open_stream(req).await?;
        let (tx, rx) = mpsc::channel(16);
        let id = Uuid::new_v4().to_string();

        tokio::spawn(async move {
            while let Some(chunk) = streaming.stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx.send(StreamEvent::Chunk(bytes)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(DownloadStream { id, rx })
    }
}

async fn write_stream_to(path: &Path, mut stream: ByteStream) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        file.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{ErrorHandler, Retry};
    use crate::request::Method;
    use crate::transport::RawResponse;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted transport: pops one canned outcome per call and records
    /// every request it sees.
    struct FakeTransport {
        script: Mutex<VecDeque<Result<RawResponse>>>,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl FakeTransport {
        fn new(script: Vec<Result<RawResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last_request(&self) -> TransportRequest {
            self.seen.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
            self.seen.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::network("http", "exhausted", "script exhausted")))
        }
    }

    fn ok(status: u16) -> Result<RawResponse> {
        Ok(RawResponse {
            status,
            headers: vec![],
            body: vec![],
        })
    }

    fn ok_with_retry_after(status: u16, secs: &str) -> Result<RawResponse> {
        Ok(RawResponse {
            status,
            headers: vec![("Retry-After".to_string(), secs.to_string())],
            body: vec![],
        })
    }

    fn fast_retry(max_retries: u32) -> Retry {
        Retry::default().max_retries(max_retries).base_delay_ms(1)
    }

    #[tokio::test]
    async fn test_retries_transient_statuses() {
        let transport = FakeTransport::new(vec![ok(500), ok(502), ok(200)]);
        let client = Client::with_transport(ClientConfig::default(), transport.clone())
            .plugin(fast_retry(3));

        let resp = client
            .request(Request::get("https://example.com/x"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_honors_retry_after_zero() {
        let transport = FakeTransport::new(vec![ok_with_retry_after(429, "0"), ok(200)]);
        let client = Client::with_transport(ClientConfig::default(), transport.clone())
            .plugin(fast_retry(3));

        let resp = client
            .request(Request::get("https://example.com/x"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_returns_last_response_after_exhaustion() {
        let transport = FakeTransport::new(vec![ok(503), ok(503), ok(503)]);
        let client = Client::with_transport(ClientConfig::default(), transport.clone())
            .plugin(fast_retry(2));

        let resp = client
            .request(Request::get("https://example.com/x"))
            .await
            .unwrap();
        assert_eq!(resp.status, 503);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_transport_errors() {
        let transport = FakeTransport::new(vec![
            Err(Error::network("http", "https://example.com/x", "connection refused")),
            ok(200),
        ]);
        let client = Client::with_transport(ClientConfig::default(), transport.clone())
            .plugin(fast_retry(3));

        let resp = client
            .request(Request::get("https://example.com/x"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_retry_without_plugin() {
        let transport = FakeTransport::new(vec![ok(500)]);
        let client = Client::with_transport(ClientConfig::default(), transport.clone());

        let resp = client
            .request(Request::get("https://example.com/x"))
            .await
            .unwrap();
        assert_eq!(resp.status, 500);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_base_url_query_and_default_headers() {
        let transport = FakeTransport::new(vec![ok(200)]);
        let mut config = ClientConfig::with_base_url("https://svc.azure.example/");
        config
            .default_headers
            .insert("User-Agent".to_string(), "cobalt".to_string());
        let client = Client::with_transport(config, transport.clone());

        client
            .request(
                Request::new(Method::Get, "/items")
                    .query_param("top", "10")
                    .header("user-agent", "override"),
            )
            .await
            .unwrap();

        let sent = transport.last_request();
        assert_eq!(sent.url, "https://svc.azure.example/items?top=10");
        // Explicit request headers win over client defaults.
        assert_eq!(sent.headers.get("user-agent").map(String::as_str), Some("override"));
    }

    #[tokio::test]
    async fn test_json_body_sets_content_type() {
        let transport = FakeTransport::new(vec![ok(200)]);
        let client = Client::with_transport(ClientConfig::default(), transport.clone());

        client
            .request(Request::post("https://example.com/x").json(serde_json::json!({"a": 1})))
            .await
            .unwrap();

        let sent = transport.last_request();
        assert_eq!(
            sent.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(sent.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));
    }

    #[tokio::test]
    async fn test_error_handler_raise_propagates() {
        let transport = FakeTransport::new(vec![ok(404)]);
        let client = Client::with_transport(ClientConfig::default(), transport)
            .plugin(ErrorHandler::new().raise(true));

        let err = client
            .request(Request::get("https://example.com/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(e) if e.status == 404));
    }
}
