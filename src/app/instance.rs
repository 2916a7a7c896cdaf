use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::weatherxm_http::WeatherXmClient;
use crate::app::coordinator::{
    CoordinatorStatus, NotReady, PollingCoordinator, UPDATE_INTERVAL, spawn_polling,
};
use crate::app::services::CredentialStore;
use crate::app::session::{CredentialSession, TOKEN_REFRESH_INTERVAL, spawn_token_refresh};
use crate::domain::models::EntryRecord;
use crate::domain::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub update_interval: Duration,
    pub token_refresh_interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            update_interval: UPDATE_INTERVAL,
            token_refresh_interval: TOKEN_REFRESH_INTERVAL,
        }
    }
}

pub struct IntegrationInstance {
    entry_id: String,
    device_id: String,
    status: watch::Receiver<CoordinatorStatus>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl IntegrationInstance {
    pub async fn setup<C, S>(
        entry: &EntryRecord,
        client: Arc<C>,
        store: S,
        schedule: Schedule,
    ) -> Result<Self, NotReady>
    where
        C: WeatherXmClient,
        S: CredentialStore,
    {
        tracing::debug!(entry_id = %entry.id, station_id = %entry.station_id, "setting up WeatherXM entry");

        let session = Arc::new(CredentialSession::new(
            entry.id.clone(),
            Arc::clone(&client),
            store,
            entry.credentials(),
        ));
        let mut coordinator =
            PollingCoordinator::new(entry.station_id.clone(), client, Arc::clone(&session));

        coordinator.first_refresh().await?;

        let status = coordinator.subscribe();
        let cancel = CancellationToken::new();
        let tasks = vec![
            spawn_polling(coordinator, schedule.update_interval, cancel.child_token()),
            spawn_token_refresh(session, schedule.token_refresh_interval, cancel.child_token()),
        ];

        tracing::info!(
            entry_id = %entry.id,
            station_id = %entry.station_id,
            update_interval_secs = schedule.update_interval.as_secs(),
            token_refresh_interval_secs = schedule.token_refresh_interval.as_secs(),
            "WeatherXM entry set up"
        );

        Ok(Self {
            entry_id: entry.id.clone(),
            device_id: entry.station_id.clone(),
            status,
            cancel,
            tasks,
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.status.borrow().snapshot.clone()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status.clone()
    }

    pub async fn unload(self) {
        tracing::debug!(entry_id = %self.entry_id, "unloading WeatherXM entry");
        self.cancel.cancel();

        for task in self.tasks {
            if let Err(error) = task.await {
                tracing::warn!(entry_id = %self.entry_id, error = %error, "background task ended abnormally");
            }
        }
    }
}
