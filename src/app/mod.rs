mod config;
pub mod coordinator;
mod error;
pub mod instance;
mod logging;
mod runtime;
pub mod services;
pub mod session;
pub mod setup;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;
    log_bootstrap(&config);

    runtime::run(config)
}

pub fn run_service() -> Result<(), AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;
    log_bootstrap(&config);

    runtime::run_service(config)
}

pub fn run_setup() -> Result<(), AppError> {
    logging::init()?;

    let config = config::SetupConfig::from_env()?;

    tracing::info!(
        username = %config.username,
        station_name = ?config.station_name,
        db_path = %config.db_path,
        api_url = %config.api_url,
        "station setup initialized"
    );

    runtime::run_setup(config)
}

fn log_bootstrap(config: &config::AppConfig) {
    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        api_url = %config.api_url,
        station_id = ?config.station_id,
        update_interval_secs = config.update_interval_secs,
        token_refresh_interval_secs = config.token_refresh_interval_secs,
        request_timeout_secs = config.request_timeout_secs,
        "application bootstrap initialized"
    );
}
