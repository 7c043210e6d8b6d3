//! Normalized response model.

use cobalt_core::HttpError;
use std::collections::BTreeMap;

/// Parsed response body, driven by the `content-type` header.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A normalized response: lowercase header names, repeated values
/// joined with `", "`, body parsed per content type, and the two Azure
/// correlation ids surfaced as fields.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    /// Server-assigned `x-ms-request-id`.
    pub request_id: Option<String>,
    /// Echoed `x-ms-client-request-id`.
    pub client_request_id: Option<String>,
    /// Populated by the error-handler plugin on final 4xx/5xx.
    pub error: Option<HttpError>,
}

impl Response {
    pub fn from_parts(status: u16, raw_headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in raw_headers {
            let name = name.to_ascii_lowercase();
            match headers.get_mut(&name) {
                Some(existing) => {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                None => {
                    headers.insert(name, value);
                }
            }
        }

        let content_type = headers.get("content-type").cloned().unwrap_or_default();
        let body = parse_body(&content_type, body);

        let request_id = headers.get("x-ms-request-id").cloned();
        let client_request_id = headers.get("x-ms-client-request-id").cloned();

        Self {
            status,
            headers,
            body,
            request_id,
            client_request_id,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn parse_body(content_type: &str, bytes: Vec<u8>) -> ResponseBody {
    if bytes.is_empty() {
        return ResponseBody::Empty;
    }
    if content_type.contains("application/json") || content_type.contains("+json") {
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return ResponseBody::Json(value);
        }
    }
    if content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
    {
        if let Ok(text) = String::from_utf8(bytes.clone()) {
            return ResponseBody::Text(text);
        }
    }
    ResponseBody::Bytes(bytes)
}
