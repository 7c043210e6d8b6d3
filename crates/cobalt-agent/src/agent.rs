//! Credential agent: one long-lived task per named credential.
//!
//! The agent owns the token lifecycle for its credential: it acquires
//! through the configured source, stores the result in the registry,
//! arms a proactive refresh timer, and retries failures with capped
//! exponential backoff. All transitions are serialized on the agent
//! task, so readers of the registry never observe torn state.

use crate::config::{AgentConfig, Prefetch};
use crate::registry::Registry;
use chrono::Utc;
use cobalt_core::events::{
    AuthEvent, TokenAcquiredPayload, TokenRefreshExhaustedPayload, TokenRefreshFailedPayload,
    TokenRefreshScheduledPayload,
};
use cobalt_core::{AccessToken, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::warn;

const MAILBOX_CAPACITY: usize = 16;
const BACKOFF_FLOOR: Duration = Duration::from_secs(30);

enum Command {
    Fetch {
        respond_to: oneshot::Sender<Result<AccessToken>>,
    },
}

/// Cheap clonable handle to a running agent.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Command>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the agent to acquire a token now (registry-miss path). The
    /// acquisition runs on the agent task; if the caller goes away the
    /// work still completes so other waiters benefit.
    pub async fn fetch(&self) -> Result<AccessToken> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Fetch { respond_to: tx })
            .await
            .map_err(|_| Error::agent_fetch_failed(&*self.name, "agent is not running"))?;
        rx.await
            .map_err(|_| Error::agent_fetch_failed(&*self.name, "agent dropped the request"))?
    }

    /// Stop the agent loop; any pending refresh timer is cancelled.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The per-credential actor.
pub struct CredentialAgent {
    config: AgentConfig,
    registry: Registry,
    http: reqwest::Client,
    rx: mpsc::Receiver<Command>,
    retry_count: u32,
    // Single-slot deadline: overwriting it supersedes any previously
    // scheduled refresh, so stale timers cannot fire.
    refresh_at: Option<Instant>,
}

impl CredentialAgent {
    /// Register and start an agent task. With [`Prefetch::Sync`] the
    /// first acquisition completes (or fails and schedules a retry)
    /// before this returns.
    pub async fn spawn(
        config: AgentConfig,
        registry: Registry,
        http: reqwest::Client,
    ) -> Result<AgentHandle> {
        if config.name.is_empty() {
            return Err(Error::missing_required("name"));
        }

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = AgentHandle {
            name: config.name.clone().into(),
            tx,
            shutdown_tx: Arc::new(shutdown_tx),
        };
        registry.register(handle.clone()).await?;

        let mut agent = CredentialAgent {
            config,
            registry,
            http,
            rx,
            retry_count: 0,
            refresh_at: None,
        };

        match agent.config.prefetch {
            Prefetch::Sync => match agent.acquire().await {
                Ok(token) => agent.store_and_schedule(token).await,
                Err(e) => {
                    warn!(
                        credential = %agent.config.name,
                        error = %e,
                        "Initial token acquisition failed, scheduling immediate retry"
                    );
                    agent.refresh_at = Some(Instant::now());
                }
            },
            Prefetch::Async => agent.refresh_at = Some(Instant::now()),
        }

        tokio::spawn(agent.run(shutdown_rx));
        Ok(handle)
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let refresh_at = self.refresh_at;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Fetch { respond_to }) => self.handle_fetch(respond_to).await,
                    None => break,
                },
                _ = wait_until(refresh_at) => self.refresh().await,
            }
        }
        self.registry.deregister(&self.config.name).await;
    }

    /// Registry-miss path. Commands are processed serially, so a miss
    /// queued behind an acquisition that has since succeeded is
    /// answered from the registry without a second round-trip.
    async fn handle_fetch(&mut self, respond_to: oneshot::Sender<Result<AccessToken>>) {
        if let Some(token) = self.registry.token(&self.config.name).await {
            let _ = respond_to.send(Ok(token));
            return;
        }
        match self.acquire().await {
            Ok(token) => {
                self.retry_count = 0;
                self.store_and_schedule(token.clone()).await;
                let _ = respond_to.send(Ok(token));
            }
            // On-demand failures carry no state transitions; scheduled
            // refresh retries are unaffected.
            Err(e) => {
                let _ = respond_to.send(Err(e));
            }
        }
    }

    async fn refresh(&mut self) {
        self.refresh_at = None;
        match self.acquire().await {
            Ok(token) => {
                self.retry_count = 0;
                self.store_and_schedule(token).await;
            }
            Err(e) if self.retry_count < self.config.max_retries => {
                let delay = self.config.retry_delay.delay(self.retry_count);
                AuthEvent::TokenRefreshFailed(TokenRefreshFailedPayload {
                    credential: self.config.name.clone(),
                    attempt: self.retry_count,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                })
                .emit();
                self.retry_count += 1;
                self.refresh_at = Some(Instant::now() + delay);
            }
            Err(e) => {
                AuthEvent::TokenRefreshExhausted(TokenRefreshExhaustedPayload {
                    credential: self.config.name.clone(),
                    attempts: self.retry_count,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                })
                .emit();
                self.retry_count = 0;
                self.refresh_at = Some(Instant::now() + BACKOFF_FLOOR);
            }
        }
    }

    async fn acquire(&self) -> Result<AccessToken> {
        self.config.source.fetch(&self.http).await
    }

    async fn store_and_schedule(&mut self, token: AccessToken) {
        let delay_secs = token.refresh_in_secs(self.config.refresh_before);
        AuthEvent::TokenAcquired(TokenAcquiredPayload {
            credential: self.config.name.clone(),
            expires_at: token.expires_at,
            timestamp: Utc::now(),
        })
        .emit();
        self.registry.store_token(&self.config.name, token).await;
        self.refresh_at = Some(Instant::now() + Duration::from_secs(delay_secs));
        AuthEvent::TokenRefreshScheduled(TokenRefreshScheduledPayload {
            credential: self.config.name.clone(),
            delay_secs,
            timestamp: Utc::now(),
        })
        .emit();
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}
