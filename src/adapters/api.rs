use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use tokio::sync::watch;

use crate::app::coordinator::CoordinatorStatus;
use crate::app::services::{EntryQueryHandler, ServiceError, SqliteEntryService};
use crate::domain::fields::{SensorState, find_field, sensor_states};

#[derive(Clone)]
pub struct ApiState {
    pub device_id: String,
    pub coordinator: watch::Receiver<CoordinatorStatus>,
    pub entries: SqliteEntryService,
}

impl ApiState {
    fn status(&self) -> CoordinatorStatus {
        self.coordinator.borrow().clone()
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorDiagnosticsResponse {
    pub device_id: String,
    pub has_snapshot: bool,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_success_at: Option<String>,
    pub last_attempt_at: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub id: String,
    pub title: String,
    pub station_id: String,
    pub station_name: String,
    pub username: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntriesDiagnosticsResponse {
    pub schema_version: u32,
    pub entries: Vec<EntrySummary>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_sensors_endpoint)
        .service(get_sensor_endpoint)
        .service(get_snapshot_endpoint)
        .service(get_coordinator_diagnostics_endpoint)
        .service(get_entries_diagnostics_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/sensors")]
async fn list_sensors_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let status = state.status();
    let sensors: Vec<SensorState> = sensor_states(
        &state.device_id,
        status.snapshot.as_ref(),
        status.last_update_success,
    );

    HttpResponse::Ok().json(sensors)
}

#[get("/sensors/{key}")]
async fn get_sensor_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let key = path.into_inner();
    let Some(field) = find_field(&key) else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("unknown sensor: {key}")
        }));
    };

    let status = state.status();
    HttpResponse::Ok().json(SensorState::observe(
        field,
        &state.device_id,
        status.snapshot.as_ref(),
        status.last_update_success,
    ))
}

#[get("/snapshot")]
async fn get_snapshot_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.status().snapshot {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "no data available yet"
        })),
    }
}

#[get("/diagnostics/coordinator")]
async fn get_coordinator_diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let status = state.status();

    HttpResponse::Ok().json(CoordinatorDiagnosticsResponse {
        device_id: state.device_id.clone(),
        has_snapshot: status.snapshot.is_some(),
        last_update_success: status.last_update_success,
        last_error: status.last_error,
        last_success_at: status.last_success_at,
        last_attempt_at: status.last_attempt_at,
        consecutive_failures: status.consecutive_failures,
    })
}

#[get("/diagnostics/entries")]
async fn get_entries_diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let schema_version = match state.entries.get_schema_version() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };
    let entries = match state.entries.list_entries() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };

    let entries = entries
        .into_iter()
        .map(|entry| EntrySummary {
            id: entry.id,
            title: entry.title,
            station_id: entry.station_id,
            station_name: entry.station_name,
            username: entry.username,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
        .collect();

    HttpResponse::Ok().json(EntriesDiagnosticsResponse {
        schema_version,
        entries,
    })
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
    }
}
