//! Test helper functions and fakes shared by the integration tests.

use async_trait::async_trait;
use chrono::Utc;
use cobalt_auth::federation::{FederatedTokenProvider, ProviderOptions};
use cobalt_core::Result;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::{Request, Respond, ResponseTemplate};

static TRACING: Once = Once::new();

/// Initialize test logging once; respects `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Federation provider that hands out a fixed assertion.
pub struct StaticAssertion {
    pub assertion: String,
}

impl StaticAssertion {
    pub fn new(assertion: impl Into<String>) -> Self {
        Self {
            assertion: assertion.into(),
        }
    }
}

#[async_trait]
impl FederatedTokenProvider for StaticAssertion {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn assertion(&self, _identity_id: &str, _opts: &ProviderOptions) -> Result<String> {
        Ok(self.assertion.clone())
    }
}

/// Responder that fails the first `failures` calls with the given
/// status, then returns identity tokens named `token-<n>`.
pub struct FlakyIdentityEndpoint {
    counter: AtomicUsize,
    failures: usize,
    failure_status: u16,
    lifetime_secs: i64,
}

impl FlakyIdentityEndpoint {
    pub fn new(failures: usize, failure_status: u16, lifetime_secs: i64) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            failures,
            failure_status,
            lifetime_secs,
        }
    }
}

impl Respond for FlakyIdentityEndpoint {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(self.failure_status)
                .insert_header("Retry-After", "0")
                .set_body_json(serde_json::json!({}))
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": format!("token-{n}"),
                "expires_on": (Utc::now().timestamp() + self.lifetime_secs).to_string(),
                "token_type": "Bearer",
                "resource": "https://management.azure.com/",
            }))
        }
    }
}
