use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.weatherxm.com/api/v1";

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh";
const DEVICES_PATH: &str = "/me/devices";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {message}")]
    Request {
        endpoint: &'static str,
        message: String,
    },
}

#[async_trait]
pub trait WeatherXmClient: Send + Sync + 'static {
    async fn login(&self, username: &str, password: &str) -> Result<HttpReply, ClientError>;
    async fn refresh(&self, refresh_token: &str) -> Result<HttpReply, ClientError>;
    async fn list_devices(&self, access_token: &str) -> Result<HttpReply, ClientError>;
    async fn device(
        &self,
        access_token: &str,
        device_id: &str,
    ) -> Result<HttpReply, ClientError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Clone)]
pub struct ReqwestWeatherXmClient {
    base_url: String,
    http: Client,
}

impl ReqwestWeatherXmClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<HttpReply, ClientError> {
        let to_client_error = |err: reqwest::Error| ClientError::Request {
            endpoint,
            message: err.to_string(),
        };

        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(to_client_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(to_client_error)?;

        tracing::trace!(endpoint, status, "weatherxm api responded");

        Ok(HttpReply { status, body })
    }
}

#[async_trait]
impl WeatherXmClient for ReqwestWeatherXmClient {
    async fn login(&self, username: &str, password: &str) -> Result<HttpReply, ClientError> {
        let request = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest { username, password });
        self.send(LOGIN_PATH, request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<HttpReply, ClientError> {
        let request = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token });
        self.send(REFRESH_PATH, request).await
    }

    async fn list_devices(&self, access_token: &str) -> Result<HttpReply, ClientError> {
        let request = self
            .http
            .get(self.url(DEVICES_PATH))
            .bearer_auth(access_token);
        self.send(DEVICES_PATH, request).await
    }

    async fn device(
        &self,
        access_token: &str,
        device_id: &str,
    ) -> Result<HttpReply, ClientError> {
        let request = self
            .http
            .get(self.url(&format!("{DEVICES_PATH}/{device_id}")))
            .bearer_auth(access_token);
        self.send(DEVICES_PATH, request).await
    }
}
