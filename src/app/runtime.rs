use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::weatherxm_http::{ReqwestWeatherXmClient, WeatherXmClient};
use crate::app::config::{AppConfig, SetupConfig};
use crate::app::error::AppError;
use crate::app::instance::{IntegrationInstance, Schedule};
use crate::app::services::{CredentialStore, EntryQueryHandler, SqliteEntryService};
use crate::app::setup::{SetupRequest, create_entry};
use crate::domain::models::EntryRecord;

struct Bootstrap {
    entries: SqliteEntryService,
    entry: EntryRecord,
    client: Arc<ReqwestWeatherXmClient>,
    schedule: Schedule,
}

fn open_entries(db_path: &str) -> Result<SqliteEntryService, AppError> {
    let mut connection =
        crate::adapters::db::open_connection(db_path).map_err(AppError::database_init)?;
    crate::adapters::db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    Ok(SqliteEntryService::new(Arc::new(Mutex::new(connection))))
}

fn bootstrap(config: &AppConfig) -> Result<Bootstrap, AppError> {
    let entries = open_entries(&config.db_path)?;
    let entry = select_entry(&entries, config.station_id.as_deref())?;
    let client = ReqwestWeatherXmClient::new(&config.api_url, config.request_timeout())
        .map_err(AppError::runtime)?;

    tracing::info!(
        entry_id = %entry.id,
        station_id = %entry.station_id,
        title = %entry.title,
        "config entry selected"
    );

    Ok(Bootstrap {
        entries,
        entry,
        client: Arc::new(client),
        schedule: Schedule {
            update_interval: config.update_interval(),
            token_refresh_interval: config.token_refresh_interval(),
        },
    })
}

pub fn select_entry<E>(entries: &E, station_id: Option<&str>) -> Result<EntryRecord, AppError>
where
    E: EntryQueryHandler,
{
    if let Some(station_id) = station_id {
        return entries
            .find_entry_by_station(station_id)
            .map_err(AppError::database_init)?
            .ok_or_else(|| {
                AppError::config(format!(
                    "no config entry for station {station_id}; run wxm_setup first"
                ))
            });
    }

    let mut all = entries.list_entries().map_err(AppError::database_init)?;
    match all.len() {
        0 => Err(AppError::config("no config entry stored; run wxm_setup first")),
        1 => Ok(all.remove(0)),
        count => Err(AppError::config(format!(
            "{count} config entries stored; set WXM_STATION_ID to pick one"
        ))),
    }
}

pub async fn setup_with_retry<C, E>(
    entries: &E,
    entry_id: &str,
    client: Arc<C>,
    schedule: Schedule,
    initial_delay: Duration,
) -> Result<IntegrationInstance, AppError>
where
    C: WeatherXmClient,
    E: EntryQueryHandler + CredentialStore + Clone,
{
    let mut delay = initial_delay;

    loop {
        let entry = entries
            .get_entry(entry_id)
            .map_err(AppError::runtime)?
            .ok_or_else(|| AppError::runtime(format!("config entry {entry_id} disappeared")))?;

        match IntegrationInstance::setup(&entry, Arc::clone(&client), entries.clone(), schedule)
            .await
        {
            Ok(instance) => return Ok(instance),
            Err(error) => {
                tracing::warn!(
                    entry_id = %entry_id,
                    error = %error,
                    retry_in_secs = delay.as_secs_f64(),
                    "entry not ready, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, initial_delay, schedule.update_interval);
            }
        }
    }
}

fn next_delay(delay: Duration, initial_delay: Duration, update_interval: Duration) -> Duration {
    delay
        .saturating_mul(2)
        .min(update_interval.max(initial_delay))
}

async fn wait_for_instance(
    boot: &Bootstrap,
    retry: Duration,
) -> Result<Option<IntegrationInstance>, AppError> {
    tokio::select! {
        result = setup_with_retry(
            &boot.entries,
            &boot.entry.id,
            Arc::clone(&boot.client),
            boot.schedule,
            retry,
        ) => result.map(Some),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested before the entry was ready");
            Ok(None)
        }
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let boot = bootstrap(&config)?;

    actix_web::rt::System::new().block_on(async move {
        let Some(instance) = wait_for_instance(&boot, config.setup_retry()).await? else {
            return Ok(());
        };

        let api_state = ApiState {
            device_id: instance.device_id().to_string(),
            coordinator: instance.subscribe(),
            entries: boot.entries.clone(),
        };

        tracing::info!(bind = %config.http_bind, "http server starting");

        let server_result = match HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)
        {
            Ok(server) => server.run().await,
            Err(error) => Err(error),
        };

        instance.unload().await;
        server_result.map_err(AppError::runtime)
    })
}

pub fn run_service(config: AppConfig) -> Result<(), AppError> {
    let boot = bootstrap(&config)?;

    actix_web::rt::System::new().block_on(async move {
        let Some(instance) = wait_for_instance(&boot, config.setup_retry()).await? else {
            return Ok(());
        };
        let mut updates = instance.subscribe();

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = updates.borrow_and_update().clone();
                    if status.last_update_success {
                        tracing::info!(
                            station_id = %instance.device_id(),
                            last_success_at = ?status.last_success_at,
                            "station data updated"
                        );
                    } else {
                        tracing::warn!(
                            station_id = %instance.device_id(),
                            consecutive_failures = status.consecutive_failures,
                            error = ?status.last_error,
                            "station update failed"
                        );
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        instance.unload().await;
        Ok(())
    })
}

pub fn run_setup(config: SetupConfig) -> Result<(), AppError> {
    let entries = open_entries(&config.db_path)?;
    let client = ReqwestWeatherXmClient::new(&config.api_url, config.request_timeout())
        .map_err(AppError::runtime)?;
    let request = SetupRequest {
        username: config.username,
        password: config.password,
        station_name: config.station_name,
    };

    let outcome = actix_web::rt::System::new()
        .block_on(async move { create_entry(&client, &entries, &request).await })
        .map_err(AppError::setup)?;

    tracing::info!(
        entry_id = %outcome.entry_id,
        station_id = %outcome.station.id,
        title = %outcome.title,
        "station configured"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{next_delay, select_entry, setup_with_retry};
    use crate::adapters::db::insert_entry;
    use crate::adapters::weatherxm_http::HttpReply;
    use crate::app::instance::Schedule;
    use crate::app::services::{EntryQueryHandler, SqliteEntryService};
    use crate::domain::credentials::CredentialPair;
    use crate::test_support::{
        ScriptedClient, device_body, open_test_connection, sample_new_entry, token_reply,
    };

    fn entries_with(name: &str, stations: &[&str]) -> (SqliteEntryService, Vec<String>) {
        let connection = open_test_connection(name);
        let ids = stations
            .iter()
            .map(|station| {
                insert_entry(&connection, &sample_new_entry(station)).expect("insert should succeed")
            })
            .collect();

        (SqliteEntryService::new(Arc::new(Mutex::new(connection))), ids)
    }

    fn slow_schedule() -> Schedule {
        Schedule {
            update_interval: Duration::from_secs(3600),
            token_refresh_interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn selects_only_entry_without_station_filter() {
        let (entries, ids) = entries_with("select-single.sqlite", &["device-1"]);

        let entry = select_entry(&entries, None).expect("entry should be selected");

        assert_eq!(entry.id, ids[0]);
    }

    #[test]
    fn selects_entry_by_station() {
        let (entries, _) = entries_with("select-station.sqlite", &["device-1", "device-2"]);

        let entry = select_entry(&entries, Some("device-2")).expect("entry should be selected");

        assert_eq!(entry.station_id, "device-2");
    }

    #[test]
    fn selection_errors_point_at_the_fix() {
        let (empty, _) = entries_with("select-empty.sqlite", &[]);
        let (several, _) = entries_with("select-several.sqlite", &["device-1", "device-2"]);

        assert_eq!(
            select_entry(&empty, None).unwrap_err().to_string(),
            "invalid configuration: no config entry stored; run wxm_setup first"
        );
        assert_eq!(
            select_entry(&several, None).unwrap_err().to_string(),
            "invalid configuration: 2 config entries stored; set WXM_STATION_ID to pick one"
        );
        assert_eq!(
            select_entry(&several, Some("device-9")).unwrap_err().to_string(),
            "invalid configuration: no config entry for station device-9; run wxm_setup first"
        );
    }

    #[test]
    fn retry_delay_doubles_up_to_update_interval() {
        let initial = Duration::from_secs(30);
        let cap = Duration::from_secs(600);

        assert_eq!(next_delay(initial, initial, cap), Duration::from_secs(60));
        assert_eq!(next_delay(Duration::from_secs(480), initial, cap), cap);
        assert_eq!(
            next_delay(Duration::from_secs(30), Duration::from_secs(900), cap),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn retry_delay_saturates_on_huge_settings() {
        let huge = Duration::from_secs(u64::MAX);

        assert_eq!(next_delay(huge, huge, huge), huge);
        assert_eq!(
            next_delay(huge, Duration::from_secs(1), Duration::from_secs(600)),
            Duration::from_secs(600)
        );
    }

    #[actix_web::test]
    async fn retries_until_first_refresh_succeeds() {
        let (entries, ids) = entries_with("retry-ok.sqlite", &["device-1"]);
        let client = Arc::new(ScriptedClient::default());
        client.push_device(HttpReply::new(503, "maintenance"));
        client.push_device(HttpReply::new(200, device_body(9.5).to_string()));

        let instance = setup_with_retry(
            &entries,
            &ids[0],
            Arc::clone(&client),
            slow_schedule(),
            Duration::from_millis(5),
        )
        .await
        .expect("setup should eventually succeed");

        assert!(instance.latest().is_some());
        assert_eq!(client.device_calls().len(), 2);
        instance.unload().await;
    }

    #[actix_web::test]
    async fn retry_uses_tokens_rotated_by_failed_attempt() {
        let (entries, ids) = entries_with("retry-rotated.sqlite", &["device-1"]);
        let client = Arc::new(ScriptedClient::default());
        client.push_device(HttpReply::new(401, "expired"));
        client.push_refresh(token_reply("access-2", "refresh-2"));
        client.push_device(HttpReply::new(500, "oops"));
        client.push_device(HttpReply::new(200, device_body(9.5).to_string()));

        let instance = setup_with_retry(
            &entries,
            &ids[0],
            Arc::clone(&client),
            slow_schedule(),
            Duration::from_millis(5),
        )
        .await
        .expect("setup should eventually succeed");

        let calls = client.device_calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].0, "access-2");
        assert_eq!(client.refresh_tokens_used(), vec!["refresh-1".to_string()]);

        let stored = entries
            .get_entry(&ids[0])
            .expect("query should succeed")
            .expect("entry should exist");
        assert_eq!(stored.credentials(), CredentialPair::new("access-2", "refresh-2"));
        instance.unload().await;
    }
}
