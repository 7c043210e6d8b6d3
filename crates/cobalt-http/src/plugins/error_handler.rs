//! Error normalization for final 4xx/5xx responses.

use super::Plugin;
use crate::request::Request;
use crate::response::{Response, ResponseBody};
use async_trait::async_trait;
use cobalt_core::{Error, HttpError, Result};

/// Converts a final response with `status >= 400` into an [`HttpError`].
/// With `raise` set the pipeline returns the error; otherwise it is
/// attached to the response for the caller to inspect.
pub struct ErrorHandler {
    raise: bool,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self { raise: false }
    }

    pub fn raise(mut self, raise: bool) -> Self {
        self.raise = raise;
        self
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ErrorHandler {
    fn name(&self) -> &'static str {
        "error_handler"
    }

    async fn on_response(&self, req: &Request, resp: &mut Response) -> Result<()> {
        if resp.status < 400 {
            return Ok(());
        }
        let error = normalize(req, resp);
        if self.raise {
            return Err(Error::Http(error));
        }
        resp.error = Some(error);
        Ok(())
    }
}

/// Body precedence: nested `{"error": {"code", "message"}}`, then flat
/// `{"code", "message"}`, then a string body as the message, then a
/// canned status message.
fn normalize(req: &Request, resp: &Response) -> HttpError {
    let (error_code, message) = match &resp.body {
        ResponseBody::Json(value) => {
            let nested = value.get("error").filter(|v| v.is_object());
            let source = nested.unwrap_or(value);
            let code = source
                .get("code")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let message = source
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            match (code, message) {
                (None, None) => match value.as_str() {
                    Some(s) => (None, s.to_string()),
                    None => (None, canned_message(resp.status).to_string()),
                },
                (code, message) => {
                    let message =
                        message.unwrap_or_else(|| canned_message(resp.status).to_string());
                    (code, message)
                }
            }
        }
        ResponseBody::Text(text) if !text.trim().is_empty() => (None, text.trim().to_string()),
        _ => (None, canned_message(resp.status).to_string()),
    };

    HttpError {
        status: resp.status,
        error_code,
        message,
        request_id: resp.request_id.clone(),
        url: Some(req.url.clone()),
    }
}

pub(crate) fn canned_message(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        412 => "Precondition Failed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "HTTP Error",
    }
}
