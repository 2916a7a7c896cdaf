use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::adapters::weatherxm_http::WeatherXmClient;
use crate::app::services::{EntryCommandHandler, EntryQueryHandler, ServiceError};
use crate::domain::credentials::parse_token_response;
use crate::domain::models::{NewEntryRecord, StationSummary, parse_station_list};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid credentials: {0}")]
    InvalidAuth(String),
    #[error("failed to fetch stations: {0}")]
    StationsUnavailable(String),
    #[error("station {name:?} not found; available stations: {}", .available.join(", "))]
    StationNotFound { name: String, available: Vec<String> },
    #[error("several stations available, pick one of: {}", .available.join(", "))]
    StationSelectionRequired { available: Vec<String> },
    #[error("station {0} is already configured")]
    AlreadyConfigured(String),
    #[error("failed to store config entry: {0}")]
    Storage(#[from] ServiceError),
}

#[derive(Clone)]
pub struct SetupRequest {
    pub username: String,
    pub password: String,
    pub station_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetupOutcome {
    pub entry_id: String,
    pub title: String,
    pub station: StationSummary,
}

pub async fn create_entry<C, E>(
    client: &C,
    entries: &E,
    request: &SetupRequest,
) -> Result<SetupOutcome, SetupError>
where
    C: WeatherXmClient,
    E: EntryQueryHandler + EntryCommandHandler,
{
    tracing::debug!(username = %request.username, "authenticating with WeatherXM API");
    let login = client
        .login(&request.username, &request.password)
        .await
        .map_err(|err| SetupError::InvalidAuth(err.to_string()))?;
    if !login.is_ok() {
        return Err(SetupError::InvalidAuth(format!(
            "HTTP {} - {}",
            login.status, login.body
        )));
    }
    let credentials = parse_token_response(&login.body).map_err(|err| {
        tracing::error!(error = %err, "authentication response missing expected tokens");
        SetupError::InvalidAuth(err.to_string())
    })?;

    let devices = client
        .list_devices(&credentials.access_token)
        .await
        .map_err(|err| SetupError::StationsUnavailable(err.to_string()))?;
    if !devices.is_ok() {
        return Err(SetupError::StationsUnavailable(format!(
            "HTTP {} - {}",
            devices.status, devices.body
        )));
    }
    let payload: Value = serde_json::from_str(&devices.body)
        .map_err(|err| SetupError::StationsUnavailable(err.to_string()))?;
    let stations = parse_station_list(&payload).ok_or_else(|| {
        SetupError::StationsUnavailable("device list must be a JSON array".to_string())
    })?;

    let names: Vec<&str> = stations.iter().map(|station| station.name.as_str()).collect();
    tracing::debug!(stations = ?names, "stations fetched");

    let station = select_station(stations, request.station_name.as_deref())?;

    if entries.find_entry_by_station(&station.id)?.is_some() {
        return Err(SetupError::AlreadyConfigured(station.id));
    }

    let title = format!("WeatherXM {}", station.name);
    let entry_id = entries.create_entry(&NewEntryRecord {
        title: title.clone(),
        station_id: station.id.clone(),
        station_name: station.name.clone(),
        username: request.username.clone(),
        access_token: credentials.access_token,
        refresh_token: credentials.refresh_token,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })?;

    tracing::info!(entry_id = %entry_id, station_id = %station.id, "config entry created");

    Ok(SetupOutcome {
        entry_id,
        title,
        station,
    })
}

fn select_station(
    mut stations: Vec<StationSummary>,
    wanted: Option<&str>,
) -> Result<StationSummary, SetupError> {
    match wanted {
        Some(name) => match stations.iter().position(|station| station.name == name) {
            Some(index) => Ok(stations.swap_remove(index)),
            None => Err(SetupError::StationNotFound {
                name: name.to_string(),
                available: station_names(&stations),
            }),
        },
        None if stations.len() == 1 => Ok(stations.remove(0)),
        None => Err(SetupError::StationSelectionRequired {
            available: station_names(&stations),
        }),
    }
}

fn station_names(stations: &[StationSummary]) -> Vec<String> {
    stations
        .iter()
        .map(|station| station.name.clone())
        .collect()
}
