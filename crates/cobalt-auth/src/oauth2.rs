//! OAuth2 JWT-bearer exchange against Azure AD.

use cobalt_core::error::StsErrorKind;
use cobalt_core::{AccessToken, Error, ExpiresIn, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_EXPIRES_IN: i64 = 3600;

/// Azure AD authority selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Cloud {
    Public,
    Government,
    China,
    Germany,
    /// Custom authority base URL (sovereign stacks, tests).
    Custom(String),
}

impl Default for Cloud {
    fn default() -> Self {
        Cloud::Public
    }
}

impl Cloud {
    pub fn authority_base(&self) -> &str {
        match self {
            Cloud::Public => "https://login.microsoftonline.com",
            Cloud::Government => "https://login.microsoftonline.us",
            Cloud::China => "https://login.chinacloudapi.cn",
            Cloud::Germany => "https://login.microsoftonline.de",
            Cloud::Custom(base) => base.trim_end_matches('/'),
        }
    }

    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_base(), tenant_id)
    }
}

impl From<String> for Cloud {
    fn from(s: String) -> Self {
        match s.as_str() {
            "public" => Cloud::Public,
            "government" => Cloud::Government,
            "china" => Cloud::China,
            "germany" => Cloud::Germany,
            _ => Cloud::Custom(s),
        }
    }
}

impl From<Cloud> for String {
    fn from(cloud: Cloud) -> Self {
        match cloud {
            Cloud::Public => "public".to_string(),
            Cloud::Government => "government".to_string(),
            Cloud::China => "china".to_string(),
            Cloud::Germany => "germany".to_string(),
            Cloud::Custom(base) => base,
        }
    }
}

/// One token exchange request.
#[derive(Debug, Clone)]
pub struct ExchangeParams {
    pub tenant_id: String,
    pub client_id: String,
    pub assertion: String,
    pub scope: String,
    pub cloud: Cloud,
    pub timeout: Option<Duration>,
}

/// Azure AD STS error envelope.
#[derive(Debug, Default, Deserialize)]
struct StsErrorEnvelope {
    error: Option<String>,
    error_description: Option<String>,
    error_codes: Option<Vec<i64>>,
}

/// Exchange an external assertion for an Azure AD access token.
pub async fn exchange(http: &reqwest::Client, params: &ExchangeParams) -> Result<AccessToken> {
    let endpoint = params.cloud.token_endpoint(&params.tenant_id);
    debug!(
        tenant_id = %params.tenant_id,
        client_id = %params.client_id,
        scope = %params.scope,
        "Exchanging client assertion for Azure AD token"
    );

    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", params.client_id.as_str()),
        ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE),
        ("client_assertion", params.assertion.as_str()),
        ("scope", params.scope.as_str()),
    ];

    let response = http
        .post(&endpoint)
        .form(&form)
        .timeout(params.timeout.unwrap_or(DEFAULT_TIMEOUT))
        .send()
        .await
        .map_err(|e| Error::network("azure_oauth2", &endpoint, e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| Error::network("azure_oauth2", &endpoint, e.to_string()))?;

    if (200..300).contains(&status) {
        parse_token_response(&body)
    } else {
        Err(decode_sts_error(status, &body))
    }
}

fn parse_token_response(body: &str) -> Result<AccessToken> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| Error::InvalidTokenFormat {
            detail: "token response is not a JSON object".to_string(),
        })?;

    let access_token = value
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidTokenFormat {
            detail: "token response missing access_token".to_string(),
        })?;

    let expires_in = match value.get("expires_in") {
        Some(serde_json::Value::Number(n)) => {
            ExpiresIn::Seconds(n.as_i64().unwrap_or(FALLBACK_EXPIRES_IN))
        }
        // Some gateways return the value as a string; keep it verbatim.
        Some(serde_json::Value::String(s)) => ExpiresIn::Raw(s.clone()),
        _ => {
            return Err(Error::InvalidTokenFormat {
                detail: "token response missing expires_in".to_string(),
            });
        }
    };

    let relative = expires_in.as_seconds().unwrap_or(FALLBACK_EXPIRES_IN);
    let expires_at = Utc::now().timestamp() + relative;

    let token_type = value
        .get("token_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Bearer");
    let scope = value
        .get("scope")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    AccessToken::new(access_token, token_type, scope, expires_at, expires_in)
}

/// Map an STS failure to a typed error. Numeric AADSTS codes take
/// precedence over the OAuth2 `error` string.
fn decode_sts_error(status: u16, body: &str) -> Error {
    let envelope: StsErrorEnvelope = serde_json::from_str(body).unwrap_or_default();

    let from_code = envelope
        .error_codes
        .iter()
        .flatten()
        .find_map(|code| match code {
            70021 => Some(StsErrorKind::FederationTrustMismatch),
            700016 => Some(StsErrorKind::InvalidTenantId),
            50027 => Some(StsErrorKind::InvalidJwt),
            700027 => Some(StsErrorKind::CertificateNotFound),
            _ => None,
        });

    let kind = from_code
        .or_else(|| match envelope.error.as_deref() {
            Some("invalid_client") => Some(StsErrorKind::InvalidClient),
            Some("invalid_scope") => Some(StsErrorKind::InvalidScope),
            Some("invalid_request") => Some(StsErrorKind::InvalidRequest),
            _ => None,
        })
        .unwrap_or(StsErrorKind::AuthenticationFailed);

    let description = envelope
        .error_description
        .unwrap_or_else(|| format!("token endpoint returned HTTP {status}"));

    Error::Sts {
        kind,
        error_code: envelope.error,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cloud_authority_bases() {
        assert_eq!(
            Cloud::Public.authority_base(),
            "https://login.microsoftonline.com"
        );
        assert_eq!(
            Cloud::Government.authority_base(),
            "https://login.microsoftonline.us"
        );
        assert_eq!(
            Cloud::China.authority_base(),
            "https://login.chinacloudapi.cn"
        );
        assert_eq!(
            Cloud::Germany.authority_base(),
            "https://login.microsoftonline.de"
        );
    }

    #[test]
    fn test_cloud_token_endpoint() {
        assert_eq!(
            Cloud::Public.token_endpoint("test-tenant"),
            "https://login.microsoftonline.com/test-tenant/oauth2/v2.0/token"
        );
        assert_eq!(
            Cloud::Custom("http://localhost:8080/".to_string()).token_endpoint("t"),
            "http://localhost:8080/t/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_cloud_from_string() {
        assert_eq!(Cloud::from("government".to_string()), Cloud::Government);
        assert_eq!(
            Cloud::from("https://login.example.test".to_string()),
            Cloud::Custom("https://login.example.test".to_string())
        );
    }

    #[test]
    fn test_parse_token_response_numeric_expiry() {
        let token = parse_token_response(
            r#"{"access_token":"AT","expires_in":3600,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "AT");
        assert_eq!(token.token_type, "Bearer");
        let expected = Utc::now().timestamp() + 3600;
        assert!((token.expires_at - expected).abs() < 2);
    }

    #[test]
    fn test_parse_token_response_string_expiry_kept_verbatim() {
        let token =
            parse_token_response(r#"{"access_token":"AT","expires_in":"whenever"}"#).unwrap();
        assert_eq!(token.expires_in, ExpiresIn::Raw("whenever".to_string()));
        // Unparseable relative expiry still yields a computed absolute one.
        let expected = Utc::now().timestamp() + 3600;
        assert!((token.expires_at - expected).abs() < 2);
    }

    #[test]
    fn test_parse_token_response_missing_fields() {
        assert!(parse_token_response(r#"{"expires_in":3600}"#).is_err());
        assert!(parse_token_response(r#"{"access_token":"AT"}"#).is_err());
        assert!(parse_token_response("not json").is_err());
    }

    #[test]
    fn test_sts_numeric_code_beats_error_string() {
        let err = decode_sts_error(
            400,
            r#"{"error":"invalid_client","error_description":"AADSTS700016","error_codes":[700016]}"#,
        );
        match err {
            Error::Sts { kind, error_code, .. } => {
                assert_eq!(kind, StsErrorKind::InvalidTenantId);
                assert_eq!(error_code.as_deref(), Some("invalid_client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_sts_error_string_fallback() {
        let err = decode_sts_error(401, r#"{"error":"invalid_scope","error_codes":[999]}"#);
        assert!(matches!(
            err,
            Error::Sts {
                kind: StsErrorKind::InvalidScope,
                ..
            }
        ));
    }

    #[test]
    fn test_sts_unknown_error_maps_to_authentication_failed() {
        let err = decode_sts_error(500, "plain text failure");
        match err {
            Error::Sts { kind, description, .. } => {
                assert_eq!(kind, StsErrorKind::AuthenticationFailed);
                assert_eq!(description, "token endpoint returned HTTP 500");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
