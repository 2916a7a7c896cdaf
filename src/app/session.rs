use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::weatherxm_http::{ClientError, WeatherXmClient};
use crate::app::services::CredentialStore;
use crate::domain::credentials::{CredentialPair, TokenParseError, parse_token_response};

pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token refresh rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token refresh returned a malformed body: {source}")]
    Malformed {
        #[source]
        source: TokenParseError,
        body: String,
    },
    #[error("token refresh request failed: {0}")]
    Transport(#[source] ClientError),
}

pub struct CredentialSession<C, S> {
    entry_id: String,
    client: Arc<C>,
    store: S,
    credentials: RwLock<CredentialPair>,
    refresh_guard: Mutex<()>,
}

impl<C, S> CredentialSession<C, S>
where
    C: WeatherXmClient,
    S: CredentialStore,
{
    pub fn new(
        entry_id: impl Into<String>,
        client: Arc<C>,
        store: S,
        credentials: CredentialPair,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            client,
            store,
            credentials: RwLock::new(credentials),
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn credentials(&self) -> CredentialPair {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> String {
        self.credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    pub async fn refresh(&self) -> Result<CredentialPair, AuthError> {
        let observed = self.credentials();
        self.refresh_unless_rotated(&observed).await
    }

    // Used after a 401: the pair may have been rotated while the failed
    // request was in flight, in which case the current pair is returned.
    pub async fn refresh_if_stale(
        &self,
        failed_access_token: &str,
    ) -> Result<CredentialPair, AuthError> {
        let current = self.credentials();
        let observed = CredentialPair {
            access_token: failed_access_token.to_string(),
            refresh_token: current.refresh_token,
        };
        self.refresh_unless_rotated(&observed).await
    }

    async fn refresh_unless_rotated(
        &self,
        observed: &CredentialPair,
    ) -> Result<CredentialPair, AuthError> {
        let _guard = self.refresh_guard.lock().await;

        let current = self.credentials();
        if current != *observed {
            tracing::debug!(
                entry_id = %self.entry_id,
                "token pair already rotated by a concurrent refresh"
            );
            return Ok(current);
        }

        tracing::debug!(entry_id = %self.entry_id, "refreshing WeatherXM token");

        let reply = self
            .client
            .refresh(&current.refresh_token)
            .await
            .map_err(AuthError::Transport)?;

        if !reply.is_ok() {
            tracing::error!(
                entry_id = %self.entry_id,
                status = reply.status,
                body = %reply.body,
                "failed to refresh WeatherXM token"
            );
            return Err(AuthError::Rejected {
                status: reply.status,
                body: reply.body,
            });
        }

        let refreshed = parse_token_response(&reply.body).map_err(|source| {
            tracing::error!(
                entry_id = %self.entry_id,
                error = %source,
                "token refresh response could not be parsed"
            );
            AuthError::Malformed {
                source,
                body: reply.body.clone(),
            }
        })?;

        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = refreshed.clone();

        if let Err(error) = self.store.save_credentials(&self.entry_id, &refreshed) {
            tracing::error!(
                entry_id = %self.entry_id,
                error = %error,
                "refreshed tokens could not be persisted"
            );
        }

        tracing::info!(entry_id = %self.entry_id, "successfully refreshed WeatherXM token");

        Ok(refreshed)
    }
}

pub fn spawn_token_refresh<C, S>(
    session: Arc<CredentialSession<C, S>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    C: WeatherXmClient,
    S: CredentialStore,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if let Err(error) = session.refresh().await {
                tracing::warn!(
                    entry_id = %session.entry_id(),
                    error = %error,
                    "scheduled token refresh failed; continuing with current tokens"
                );
            }
        }

        tracing::debug!(entry_id = %session.entry_id(), "token refresh task stopped");
    })
}
