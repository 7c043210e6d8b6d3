//! Workload-identity token source (AKS projected service-account token).

use crate::oauth2::{self, Cloud, ExchangeParams};
use cobalt_core::error::ManagedIdentityErrorKind;
use cobalt_core::{AccessToken, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
const TOKEN_FILE_VAR: &str = "AZURE_FEDERATED_TOKEN_FILE";
const AUTHORITY_HOST_VAR: &str = "AZURE_AUTHORITY_HOST";

type EnvLookup<'a> = &'a (dyn Fn(&str) -> Option<String> + Sync);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadIdentityConfig {
    pub scope: String,
    /// Falls back to `AZURE_TENANT_ID`.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Falls back to `AZURE_CLIENT_ID`.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Falls back to `AZURE_FEDERATED_TOKEN_FILE`.
    #[serde(default)]
    pub token_file_path: Option<PathBuf>,
    /// Falls back to `AZURE_AUTHORITY_HOST`, then the public cloud.
    #[serde(default)]
    pub cloud: Option<Cloud>,
}

impl WorkloadIdentityConfig {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            tenant_id: None,
            client_id: None,
            token_file_path: None,
            cloud: None,
        }
    }
}

fn std_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn file_error(kind: ManagedIdentityErrorKind, reason: impl Into<String>) -> Error {
    Error::ManagedIdentity {
        kind,
        provider: "workload_identity".to_string(),
        reason: reason.into(),
        status: None,
    }
}

pub async fn fetch(http: &reqwest::Client, cfg: &WorkloadIdentityConfig) -> Result<AccessToken> {
    fetch_with_env(http, cfg, &std_env).await
}

/// The environment is read at call time; explicit non-empty config
/// values always win.
pub(crate) async fn fetch_with_env(
    http: &reqwest::Client,
    cfg: &WorkloadIdentityConfig,
    env: EnvLookup<'_>,
) -> Result<AccessToken> {
    if cfg.scope.is_empty() {
        return Err(Error::missing_required("scope"));
    }

    let tenant_id = explicit(&cfg.tenant_id)
        .or_else(|| env(TENANT_ID_VAR))
        .ok_or_else(|| Error::missing_required("tenant_id"))?;
    let client_id = explicit(&cfg.client_id)
        .or_else(|| env(CLIENT_ID_VAR))
        .ok_or_else(|| Error::missing_required("client_id"))?;
    let token_file = cfg
        .token_file_path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env(TOKEN_FILE_VAR).map(PathBuf::from))
        .ok_or_else(|| {
            file_error(
                ManagedIdentityErrorKind::TokenFileNotFound,
                "no token file configured",
            )
        })?;

    let assertion = read_projected_token(&token_file).await?;

    let cloud = cfg.cloud.clone().unwrap_or_else(|| {
        env(AUTHORITY_HOST_VAR)
            .map(Cloud::Custom)
            .unwrap_or_default()
    });

    debug!(
        tenant_id = %tenant_id,
        client_id = %client_id,
        token_file = %token_file.display(),
        "Exchanging projected service-account token"
    );

    oauth2::exchange(
        http,
        &ExchangeParams {
            tenant_id,
            client_id,
            assertion,
            scope: cfg.scope.clone(),
            cloud,
            timeout: None,
        },
    )
    .await
}

async fn read_projected_token(path: &PathBuf) -> Result<String> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        let kind = if e.kind() == std::io::ErrorKind::NotFound {
            ManagedIdentityErrorKind::TokenFileNotFound
        } else {
            ManagedIdentityErrorKind::TokenFileReadError
        };
        file_error(kind, format!("{}: {e}", path.display()))
    })?;

    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(file_error(
            ManagedIdentityErrorKind::TokenFileReadError,
            format!("{}: token file is empty", path.display()),
        ));
    }
    Ok(trimmed.to_string())
}

fn explicit(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}
