//! Managed-identity token source (IMDS and App Service).

use chrono::Utc;
use cobalt_core::error::ManagedIdentityErrorKind;
use cobalt_core::{AccessToken, Error, ExpiresIn, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const API_VERSION: &str = "2019-08-01";
const MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TIMEOUT_MS: u64 = 5000;
const FALLBACK_EXPIRES_IN: i64 = 3600;

const IDENTITY_ENDPOINT_VAR: &str = "IDENTITY_ENDPOINT";
const IDENTITY_HEADER_VAR: &str = "IDENTITY_HEADER";
const FEDERATED_TOKEN_FILE_VAR: &str = "AZURE_FEDERATED_TOKEN_FILE";

type EnvLookup<'a> = &'a (dyn Fn(&str) -> Option<String> + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProvider {
    #[default]
    Auto,
    Imds,
    AppService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedIdentityConfig {
    /// Resource URI the token is requested for.
    pub resource: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub mi_res_id: Option<String>,
    #[serde(default)]
    pub provider: IdentityProvider,
    /// Metadata endpoint override (sovereign stacks, tests).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ManagedIdentityConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            client_id: None,
            object_id: None,
            mi_res_id: None,
            provider: IdentityProvider::Auto,
            endpoint: None,
            timeout_ms: None,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

fn mi_error(
    kind: ManagedIdentityErrorKind,
    provider: &str,
    reason: impl Into<String>,
    status: Option<u16>,
) -> Error {
    Error::ManagedIdentity {
        kind,
        provider: provider.to_string(),
        reason: reason.into(),
        status,
    }
}

fn std_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

pub async fn fetch(http: &reqwest::Client, cfg: &ManagedIdentityConfig) -> Result<AccessToken> {
    fetch_with_env(http, cfg, &std_env).await
}

pub(crate) async fn fetch_with_env(
    http: &reqwest::Client,
    cfg: &ManagedIdentityConfig,
    env: EnvLookup<'_>,
) -> Result<AccessToken> {
    if cfg.resource.is_empty() {
        return Err(Error::missing_required("resource"));
    }

    // The environment is consulted on every call so rotated identity
    // headers are picked up without a restart.
    match cfg.provider {
        IdentityProvider::Imds => fetch_imds(http, cfg).await,
        IdentityProvider::AppService => fetch_app_service(http, cfg, env).await,
        IdentityProvider::Auto => {
            if env(IDENTITY_ENDPOINT_VAR).is_some() && env(IDENTITY_HEADER_VAR).is_some() {
                fetch_app_service(http, cfg, env).await
            } else if env(FEDERATED_TOKEN_FILE_VAR).is_some() {
                // Workload identity is a different protocol; refuse to
                // cross over silently.
                Err(mi_error(
                    ManagedIdentityErrorKind::ProviderError,
                    "auto",
                    "use WorkloadIdentity token source",
                    None,
                ))
            } else {
                fetch_imds(http, cfg).await
            }
        }
    }
}

async fn fetch_imds(http: &reqwest::Client, cfg: &ManagedIdentityConfig) -> Result<AccessToken> {
    let endpoint = cfg.endpoint.clone().unwrap_or_else(|| IMDS_ENDPOINT.to_string());
    let mut query: Vec<(&str, &str)> = vec![
        ("api-version", API_VERSION),
        ("resource", cfg.resource.as_str()),
    ];
    // Exactly one identity selector, in precedence order.
    if let Some(id) = cfg.client_id.as_deref() {
        query.push(("client_id", id));
    } else if let Some(id) = cfg.object_id.as_deref() {
        query.push(("object_id", id));
    } else if let Some(id) = cfg.mi_res_id.as_deref() {
        query.push(("mi_res_id", id));
    }

    debug!(endpoint = %endpoint, resource = %cfg.resource, "Requesting token from IMDS");

    let mut attempt: u32 = 0;
    loop {
        let result = http
            .get(&endpoint)
            .query(&query)
            .header("Metadata", "true")
            .timeout(cfg.timeout())
            .send()
            .await;

        let delay = match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if (200..300).contains(&status) {
                    let body = response.text().await.map_err(|e| {
                        mi_error(
                            ManagedIdentityErrorKind::InvalidResponse,
                            "imds",
                            e.to_string(),
                            None,
                        )
                    })?;
                    return parse_identity_response(&body, "imds");
                }
                if status != 429 && status != 503 {
                    let body = response.text().await.unwrap_or_default();
                    return Err(provider_error("imds", status, &body));
                }
                if attempt + 1 >= MAX_ATTEMPTS {
                    return Err(mi_error(
                        ManagedIdentityErrorKind::ProviderError,
                        "imds",
                        format!("retries exhausted after {MAX_ATTEMPTS} attempts"),
                        Some(status),
                    ));
                }
                warn!(status, attempt, "IMDS throttled, backing off");
                retry_after(&response).unwrap_or_else(|| backoff_delay(attempt))
            }
            Err(e) => {
                if attempt + 1 >= MAX_ATTEMPTS {
                    return Err(mi_error(
                        ManagedIdentityErrorKind::ImdsUnavailable,
                        "imds",
                        e.to_string(),
                        None,
                    ));
                }
                warn!(error = %e, attempt, "IMDS request failed, backing off");
                backoff_delay(attempt)
            }
        };

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

async fn fetch_app_service(
    http: &reqwest::Client,
    cfg: &ManagedIdentityConfig,
    env: EnvLookup<'_>,
) -> Result<AccessToken> {
    let endpoint = env(IDENTITY_ENDPOINT_VAR).ok_or_else(|| {
        mi_error(
            ManagedIdentityErrorKind::EnvironmentNotDetected,
            "app_service",
            format!("{IDENTITY_ENDPOINT_VAR} is not set"),
            None,
        )
    })?;
    let identity_header = env(IDENTITY_HEADER_VAR).ok_or_else(|| {
        mi_error(
            ManagedIdentityErrorKind::EnvironmentNotDetected,
            "app_service",
            format!("{IDENTITY_HEADER_VAR} is not set"),
            None,
        )
    })?;

    let mut query: Vec<(&str, &str)> = vec![
        ("api-version", API_VERSION),
        ("resource", cfg.resource.as_str()),
    ];
    if let Some(id) = cfg.client_id.as_deref() {
        query.push(("client_id", id));
    }

    debug!(endpoint = %endpoint, resource = %cfg.resource, "Requesting token from App Service identity");

    let mut attempt: u32 = 0;
    loop {
        let response = http
            .get(&endpoint)
            .query(&query)
            .header("X-IDENTITY-HEADER", &identity_header)
            .timeout(cfg.timeout())
            .send()
            .await
            .map_err(|e| Error::network("azure_app_service_identity", &endpoint, e.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            let body = response.text().await.map_err(|e| {
                mi_error(
                    ManagedIdentityErrorKind::InvalidResponse,
                    "app_service",
                    e.to_string(),
                    None,
                )
            })?;
            return parse_identity_response(&body, "app_service");
        }

        // Transient statuses get the same bounded backoff as IMDS.
        if (status == 429 || status == 503) && attempt + 1 < MAX_ATTEMPTS {
            let delay = retry_after(&response).unwrap_or_else(|| backoff_delay(attempt));
            warn!(status, attempt, "App Service identity throttled, backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(provider_error("app_service", status, &body));
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis((500u64 << attempt).min(5000))
}

fn provider_error(provider: &str, status: u16, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        error_description: Option<String>,
    }

    let reason = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| match (b.error, b.error_description) {
            (Some(e), Some(d)) => Some(format!("{e}: {d}")),
            (Some(e), None) => Some(e),
            (None, Some(d)) => Some(d),
            (None, None) => None,
        })
        .unwrap_or_else(|| format!("identity endpoint returned HTTP {status}"));

    let kind = if status == 400 && reason.to_ascii_lowercase().contains("identity not found") {
        ManagedIdentityErrorKind::IdentityNotFound
    } else {
        ManagedIdentityErrorKind::ProviderError
    };
    mi_error(kind, provider, reason, Some(status))
}

/// Parse an identity-endpoint token response. `expires_on` (unix
/// seconds, string or int) wins over `expires_in`.
fn parse_identity_response(body: &str, provider: &str) -> Result<AccessToken> {
    let invalid = |reason: &str| {
        mi_error(
            ManagedIdentityErrorKind::InvalidResponse,
            provider,
            reason,
            None,
        )
    };

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| invalid("response is not a JSON object"))?;

    let access_token = value
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("response missing access_token"))?;

    let now = Utc::now().timestamp();
    let (expires_at, expires_in) = if let Some(expires_on) = value.get("expires_on") {
        let at = match expires_on {
            serde_json::Value::Number(n) => n.as_i64().unwrap_or(now + FALLBACK_EXPIRES_IN),
            serde_json::Value::String(s) => {
                s.trim().parse::<i64>().unwrap_or(now + FALLBACK_EXPIRES_IN)
            }
            _ => now + FALLBACK_EXPIRES_IN,
        };
        (at, ExpiresIn::Seconds(at - now))
    } else if let Some(expires_in) = value.get("expires_in") {
        match expires_in {
            serde_json::Value::Number(n) => {
                let relative = n.as_i64().unwrap_or(FALLBACK_EXPIRES_IN);
                (now + relative, ExpiresIn::Seconds(relative))
            }
            serde_json::Value::String(s) => {
                let relative = s.trim().parse::<i64>().unwrap_or(FALLBACK_EXPIRES_IN);
                (now + relative, ExpiresIn::Raw(s.clone()))
            }
            _ => (now + FALLBACK_EXPIRES_IN, ExpiresIn::Seconds(FALLBACK_EXPIRES_IN)),
        }
    } else {
        return Err(invalid("response missing expires_on and expires_in"));
    };

    let token_type = value
        .get("token_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Bearer");
    let scope = value
        .get("resource")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    AccessToken::new(access_token, token_type, scope, expires_at, expires_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    struct FailTwiceThenSucceed {
        counter: std::sync::atomic::AtomicUsize,
        token: String,
    }

    impl Respond for FailTwiceThenSucceed {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let n = self
                .counter
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n < 2 {
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "0")
                    .set_body_json(serde_json::json!({}))
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": self.token,
                    "expires_on": (Utc::now().timestamp() + 3600).to_string(),
                    "token_type": "Bearer",
                    "resource": "https://management.azure.com/",
                }))
            }
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[tokio::test]
    async fn test_imds_retries_on_429_and_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", API_VERSION))
            .and(query_param("client_id", "ua-1"))
            .respond_with(FailTwiceThenSucceed {
                counter: std::sync::atomic::AtomicUsize::new(0),
                token: "MI".to_string(),
            })
            .expect(3)
            .mount(&server)
            .await;

        let mut cfg = ManagedIdentityConfig::new("https://management.azure.com/");
        cfg.client_id = Some("ua-1".to_string());
        cfg.provider = IdentityProvider::Imds;
        cfg.endpoint = Some(format!("{}/metadata/identity/oauth2/token", server.uri()));

        let token = fetch_with_env(&reqwest::Client::new(), &cfg, &no_env)
            .await
            .unwrap();
        assert_eq!(token.access_token, "MI");
        assert_eq!(token.scope.as_deref(), Some("https://management.azure.com/"));
    }

    #[tokio::test]
    async fn test_imds_fails_fast_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_request",
                "error_description": "Identity not found",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = ManagedIdentityConfig::new("https://management.azure.com/");
        cfg.provider = IdentityProvider::Imds;
        cfg.endpoint = Some(format!("{}/metadata/identity/oauth2/token", server.uri()));

        let err = fetch_with_env(&reqwest::Client::new(), &cfg, &no_env)
            .await
            .unwrap_err();
        match err {
            Error::ManagedIdentity { kind, status, reason, .. } => {
                assert_eq!(kind, ManagedIdentityErrorKind::IdentityNotFound);
                assert_eq!(status, Some(400));
                assert!(reason.contains("Identity not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auto_detects_app_service_env() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-IDENTITY-HEADER", "secret-header"))
            .and(query_param("resource", "https://vault.azure.net/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "AS",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let endpoint = server.uri();
        let env = move |name: &str| match name {
            IDENTITY_ENDPOINT_VAR => Some(endpoint.clone()),
            IDENTITY_HEADER_VAR => Some("secret-header".to_string()),
            _ => None,
        };

        let cfg = ManagedIdentityConfig::new("https://vault.azure.net/");
        let token = fetch_with_env(&reqwest::Client::new(), &cfg, &env)
            .await
            .unwrap();
        assert_eq!(token.access_token, "AS");
    }

    #[tokio::test]
    async fn test_auto_refuses_workload_identity_environment() {
        let env = |name: &str| match name {
            FEDERATED_TOKEN_FILE_VAR => Some("/var/run/secrets/azure/token".to_string()),
            _ => None,
        };
        let cfg = ManagedIdentityConfig::new("https://management.azure.com/");
        let err = fetch_with_env(&reqwest::Client::new(), &cfg, &env)
            .await
            .unwrap_err();
        match err {
            Error::ManagedIdentity { reason, .. } => {
                assert_eq!(reason, "use WorkloadIdentity token source");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let cfg = ManagedIdentityConfig::new("");
        let err = fetch_with_env(&reqwest::Client::new(), &cfg, &no_env)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_parse_expires_on_string_wins_over_expires_in() {
        let at = Utc::now().timestamp() + 7200;
        let body = format!(
            r#"{{"access_token":"T","expires_on":"{at}","expires_in":60,"resource":"r"}}"#
        );
        let token = parse_identity_response(&body, "imds").unwrap();
        assert_eq!(token.expires_at, at);
        assert_eq!(token.scope.as_deref(), Some("r"));
    }

    #[test]
    fn test_parse_unparseable_expiry_falls_back() {
        let token = parse_identity_response(
            r#"{"access_token":"T","expires_on":"not-a-number"}"#,
            "imds",
        )
        .unwrap();
        let expected = Utc::now().timestamp() + FALLBACK_EXPIRES_IN;
        assert!((token.expires_at - expected).abs() < 2);
    }

    #[test]
    fn test_parse_missing_expiry_is_invalid() {
        let err = parse_identity_response(r#"{"access_token":"T"}"#, "imds").unwrap_err();
        assert!(matches!(
            err,
            Error::ManagedIdentity {
                kind: ManagedIdentityErrorKind::InvalidResponse,
                ..
            }
        ));
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(4), Duration::from_millis(5000));
    }
}
