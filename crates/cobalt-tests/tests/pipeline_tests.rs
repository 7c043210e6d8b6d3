//! Full request-pipeline scenarios: header conventions, retry, and
//! error normalization against a mock service.

use cobalt_core::Error;
use cobalt_http::{
    AzureHeaders, Client, ClientConfig, ErrorHandler, Request, RequestId, Retry, SharedKey,
};
use cobalt_tests::helpers::init_tracing;
use pretty_assertions::assert_eq;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_azure_conventions_applied_in_order() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_exists("x-ms-client-request-id"))
        .and(header_exists("x-ms-date"))
        .and(wiremock::matchers::header("x-ms-version", "2020-04-08"))
        .and(wiremock::matchers::header(
            "x-ms-return-client-request-id",
            "true",
        ))
        .respond_with(
            ResponseTemplate::new(200).insert_header("x-ms-request-id", "srv-1"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(ClientConfig::with_base_url(server.uri()))
        .unwrap()
        .plugin(RequestId::new())
        .plugin(AzureHeaders::new().api_version("2020-04-08"));

    let resp = client.request(Request::get("/items")).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.request_id.as_deref(), Some("srv-1"));
}

#[tokio::test]
async fn test_retry_then_error_normalization() {
    init_tracing();
    let server = MockServer::start().await;
    // Two throttles with Retry-After: 0, then a terminal 400 carrying a
    // structured error body.
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_json(serde_json::json!({})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("x-ms-request-id", "req-9")
                .set_body_json(serde_json::json!({
                    "error": {"code": "InvalidRequest", "message": "Bad"}
                })),
        )
        .mount(&server)
        .await;

    let client = Client::new(ClientConfig::with_base_url(server.uri()))
        .unwrap()
        .plugin(Retry::default().base_delay_ms(1))
        .plugin(ErrorHandler::new());

    let resp = client.request(Request::get("/op")).await.unwrap();
    assert_eq!(resp.status, 400);

    let error = resp.error.expect("error not normalized");
    assert_eq!(error.error_code.as_deref(), Some("InvalidRequest"));
    assert_eq!(error.message, "Bad");
    assert_eq!(error.request_id.as_deref(), Some("req-9"));
    assert_eq!(error.to_string(), "HTTP 400 [InvalidRequest]: Bad");
}

#[tokio::test]
async fn test_error_handler_raise_mode() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such blob"))
        .mount(&server)
        .await;

    let client = Client::new(ClientConfig::with_base_url(server.uri()))
        .unwrap()
        .plugin(ErrorHandler::new().raise(true));

    let err = client.request(Request::get("/blob")).await.unwrap_err();
    match err {
        Error::Http(e) => {
            assert_eq!(e.status, 404);
            assert_eq!(e.message, "no such blob");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_shared_key_signature_accepted_end_to_end() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(ClientConfig::with_base_url(server.uri()))
        .unwrap()
        .plugin(SharedKey::new("account", "c2hhcmVkLWtleS1zZWNyZXQ="));

    let resp = client
        .request(
            Request::put("/account/container/blob?comp=metadata")
                .header("x-ms-date", "Wed, 01 Jan 2020 00:00:00 GMT"),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, 201);
}
