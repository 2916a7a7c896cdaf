use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::weatherxm_http::{ClientError, WeatherXmClient};
use crate::app::services::CredentialStore;
use crate::app::session::{AuthError, CredentialSession};
use crate::domain::snapshot::{FormatError, Snapshot};

pub const UPDATE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("device data request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("device data request still unauthorized after token refresh: {body}")]
    Unauthorized { body: String },
    #[error("device data request failed: {0}")]
    Transport(#[source] ClientError),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Format(#[from] FormatError),
}

#[derive(Debug, Error)]
#[error("initial update failed: {0}")]
pub struct NotReady(#[source] pub UpdateError);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub snapshot: Option<Snapshot>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_success_at: Option<String>,
    pub last_attempt_at: Option<String>,
    pub consecutive_failures: u32,
}

enum FetchOutcome {
    Data(Snapshot),
    TokenExpired { body: String },
}

pub struct PollingCoordinator<C, S> {
    device_id: String,
    client: Arc<C>,
    session: Arc<CredentialSession<C, S>>,
    state: watch::Sender<CoordinatorStatus>,
}

impl<C, S> PollingCoordinator<C, S>
where
    C: WeatherXmClient,
    S: CredentialStore,
{
    pub fn new(
        device_id: impl Into<String>,
        client: Arc<C>,
        session: Arc<CredentialSession<C, S>>,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorStatus::default());
        Self {
            device_id: device_id.into(),
            client,
            session,
            state,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session(&self) -> &Arc<CredentialSession<C, S>> {
        &self.session
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.state.borrow().snapshot.clone()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorStatus> {
        self.state.subscribe()
    }

    pub async fn first_refresh(&mut self) -> Result<(), NotReady> {
        self.refresh().await.map_err(NotReady)
    }

    pub async fn refresh(&mut self) -> Result<(), UpdateError> {
        tracing::debug!(device_id = %self.device_id, "fetching WeatherXM device data");
        let attempted_at = now_iso();

        match self.run_cycle().await {
            Ok(snapshot) => {
                self.state.send_modify(|status| {
                    status.snapshot = Some(snapshot);
                    status.last_update_success = true;
                    status.last_error = None;
                    status.last_success_at = Some(attempted_at.clone());
                    status.last_attempt_at = Some(attempted_at);
                    status.consecutive_failures = 0;
                });
                tracing::debug!(device_id = %self.device_id, "published WeatherXM snapshot");
                Ok(())
            }
            Err(error) => {
                self.state.send_modify(|status| {
                    status.last_update_success = false;
                    status.last_error = Some(error.to_string());
                    status.last_attempt_at = Some(attempted_at);
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                });
                tracing::warn!(
                    device_id = %self.device_id,
                    error = %error,
                    "WeatherXM update failed"
                );
                Err(error)
            }
        }
    }

    async fn run_cycle(&self) -> Result<Snapshot, UpdateError> {
        let access_token = self.session.access_token();

        match self.fetch(&access_token).await? {
            FetchOutcome::Data(snapshot) => Ok(snapshot),
            FetchOutcome::TokenExpired { .. } => {
                tracing::warn!(
                    device_id = %self.device_id,
                    "token expired, refreshing and retrying data fetch"
                );
                let refreshed = self.session.refresh_if_stale(&access_token).await?;

                match self.fetch(&refreshed.access_token).await? {
                    FetchOutcome::Data(snapshot) => {
                        tracing::debug!(
                            device_id = %self.device_id,
                            "fetched data after token refresh"
                        );
                        Ok(snapshot)
                    }
                    FetchOutcome::TokenExpired { body } => {
                        Err(FetchError::Unauthorized { body }.into())
                    }
                }
            }
        }
    }

    async fn fetch(&self, access_token: &str) -> Result<FetchOutcome, UpdateError> {
        let reply = self
            .client
            .device(access_token, &self.device_id)
            .await
            .map_err(FetchError::Transport)?;

        if reply.is_unauthorized() {
            return Ok(FetchOutcome::TokenExpired { body: reply.body });
        }

        if !reply.is_ok() {
            tracing::error!(
                device_id = %self.device_id,
                status = reply.status,
                body = %reply.body,
                "failed to fetch device data"
            );
            return Err(FetchError::Status {
                status: reply.status,
                body: reply.body,
            }
            .into());
        }

        Snapshot::parse(&reply.body)
            .map(FetchOutcome::Data)
            .map_err(|error| {
                tracing::error!(
                    device_id = %self.device_id,
                    error = %error,
                    body = %reply.body,
                    "device data rejected"
                );
                UpdateError::from(error)
            })
    }
}

pub fn spawn_polling<C, S>(
    mut coordinator: PollingCoordinator<C, S>,
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

            // failures are already recorded in the published status
            let _ = coordinator.refresh().await;
        }

        tracing::debug!(device_id = %coordinator.device_id(), "polling task stopped");
    })
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
