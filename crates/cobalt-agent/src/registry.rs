//! Credential registry: name → (agent handle, current token).

use crate::agent::AgentHandle;
use cobalt_core::{AccessToken, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Shared mapping from credential name to the owning agent and its most
/// recently acquired token. Many readers; exactly one writer per name
/// (the owning agent).
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, RegistryEntry>>>,
}

struct RegistryEntry {
    handle: AgentHandle,
    token: Option<AccessToken>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its unique name.
    pub async fn register(&self, handle: AgentHandle) -> Result<()> {
        let name = handle.name().to_string();
        let mut inner = self.inner.write().await;
        if inner.contains_key(&name) {
            return Err(Error::invalid_value("name", format!("`{name}` is already registered")));
        }
        info!(credential = %name, "Registering credential agent");
        inner.insert(name, RegistryEntry { handle, token: None });
        Ok(())
    }

    pub async fn deregister(&self, name: &str) {
        let mut inner = self.inner.write().await;
        if inner.remove(name).is_some() {
            debug!(credential = %name, "Deregistered credential agent");
        }
    }

    /// Update the stored token. Called only by the owning agent.
    pub(crate) async fn store_token(&self, name: &str, token: AccessToken) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.get_mut(name) {
            entry.token = Some(token);
        }
    }

    /// Snapshot of the current token, if one has been acquired.
    pub async fn token(&self, name: &str) -> Option<AccessToken> {
        self.inner.read().await.get(name).and_then(|e| e.token.clone())
    }

    /// Snapshot of the agent handle and current token.
    pub async fn lookup(&self, name: &str) -> Option<(AgentHandle, Option<AccessToken>)> {
        self.inner
            .read()
            .await
            .get(name)
            .map(|e| (e.handle.clone(), e.token.clone()))
    }

    /// Return the cached token for `name`, or ask the owning agent to
    /// acquire one. An on-demand acquisition failure is returned as-is;
    /// the agent keeps recovering in the background.
    pub async fn fetch(&self, name: &str) -> Result<AccessToken> {
        let (handle, token) = self
            .lookup(name)
            .await
            .ok_or_else(|| Error::agent_fetch_failed(name, "unknown credential"))?;

        match token {
            Some(token) => Ok(token),
            None => handle.fetch().await,
        }
    }

    /// Like [`fetch`](Self::fetch), but panics on error.
    pub async fn must_fetch(&self, name: &str) -> AccessToken {
        match self.fetch(name).await {
            Ok(token) => token,
            Err(e) => panic!("credential `{name}` fetch failed: {e}"),
        }
    }

    /// Registered credential names.
    pub async fn names(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}
