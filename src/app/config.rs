use std::time::Duration;

use crate::adapters::weatherxm_http::DEFAULT_BASE_URL;
use crate::app::AppError;

const DEFAULT_DB_PATH: &str = "/var/lib/weatherxm/weatherxm.db";
const DEFAULT_HTTP_BIND: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub http_bind: String,
    pub api_url: String,
    pub station_id: Option<String>,
    pub update_interval_secs: u64,
    pub token_refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub setup_retry_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            db_path: string_or_default(&lookup, "DB_PATH", DEFAULT_DB_PATH),
            http_bind: string_or_default(&lookup, "HTTP_BIND", DEFAULT_HTTP_BIND),
            api_url: string_or_default(&lookup, "WXM_API_URL", DEFAULT_BASE_URL),
            station_id: optional_string(&lookup, "WXM_STATION_ID"),
            update_interval_secs: positive_or_default(&lookup, "UPDATE_INTERVAL_SECS", 600)?,
            token_refresh_interval_secs: positive_or_default(
                &lookup,
                "TOKEN_REFRESH_INTERVAL_SECS",
                30 * 24 * 60 * 60,
            )?,
            request_timeout_secs: positive_or_default(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            setup_retry_secs: positive_or_default(&lookup, "SETUP_RETRY_SECS", 30)?,
        })
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn setup_retry(&self) -> Duration {
        Duration::from_secs(self.setup_retry_secs)
    }
}

#[derive(Clone)]
pub struct SetupConfig {
    pub username: String,
    pub password: String,
    pub station_name: Option<String>,
    pub db_path: String,
    pub api_url: String,
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for SetupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("station_name", &self.station_name)
            .field("db_path", &self.db_path)
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl SetupConfig {
    pub fn from_env() -> Result<Self, AppError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = optional_string(&lookup, "WXM_USERNAME")
            .ok_or_else(|| AppError::config("WXM_USERNAME is required"))?;
        let password = lookup("WXM_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::config("WXM_PASSWORD is required"))?;

        Ok(Self {
            username,
            password,
            station_name: optional_string(&lookup, "WXM_STATION_NAME"),
            db_path: string_or_default(&lookup, "DB_PATH", DEFAULT_DB_PATH),
            api_url: string_or_default(&lookup, "WXM_API_URL", DEFAULT_BASE_URL),
            request_timeout_secs: positive_or_default(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment from file");
    }
}

fn optional_string<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn string_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    optional_string(lookup, key).unwrap_or_else(|| default.to_string())
}

fn positive_or_default<F>(lookup: &F, key: &str, default: u64) -> Result<u64, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|value| *value > 0)
            .ok_or_else(|| AppError::config(format!("{key} must be a positive number"))),
        None => Ok(default),
    }
}
