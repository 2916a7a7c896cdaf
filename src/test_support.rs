use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::weatherxm_http::{ClientError, HttpReply, WeatherXmClient};
use crate::app::services::{CredentialStore, ServiceError};
use crate::domain::credentials::CredentialPair;
use crate::domain::models::NewEntryRecord;

pub fn open_test_connection(test_name: &str) -> Connection {
    let mut connection =
        open_connection(temp_db_path(test_name).to_string_lossy().as_ref()).expect("test db should open");
    run_migrations(&mut connection).expect("test db migrations should succeed");
    connection
}

fn temp_db_path(name: &str) -> PathBuf {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join(name);
    std::mem::forget(dir);
    path
}

pub fn sample_new_entry(station_id: &str) -> NewEntryRecord {
    NewEntryRecord {
        title: format!("WeatherXM {station_id}"),
        station_id: station_id.to_string(),
        station_name: station_id.to_string(),
        username: "user@example.com".to_string(),
        access_token: "access-1".to_string(),
        refresh_token: "refresh-1".to_string(),
        created_at: "2026-02-20T10:00:00.000Z".to_string(),
    }
}

pub fn token_reply(access_token: &str, refresh_token: &str) -> HttpReply {
    HttpReply::new(
        200,
        json!({"token": access_token, "refreshToken": refresh_token}).to_string(),
    )
}

pub fn device_body(temperature: f64) -> Value {
    json!({
        "id": "device-1",
        "name": "Rainy Garden",
        "current_weather": {
            "temperature": temperature,
            "humidity": 81,
            "pressure": 1013.456,
            "wind_speed": 2.1
        },
        "rewards": {
            "actual_reward": "0.12345",
            "total_rewards": 58.2
        }
    })
}

#[derive(Default)]
pub struct ScriptedClient {
    logins: Mutex<VecDeque<HttpReply>>,
    refreshes: Mutex<VecDeque<HttpReply>>,
    device_lists: Mutex<VecDeque<HttpReply>>,
    devices: Mutex<VecDeque<HttpReply>>,
    refresh_tokens_used: Mutex<Vec<String>>,
    device_list_tokens: Mutex<Vec<String>>,
    device_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedClient {
    pub fn push_login(&self, reply: HttpReply) {
        push(&self.logins, reply);
    }

    pub fn push_refresh(&self, reply: HttpReply) {
        push(&self.refreshes, reply);
    }

    pub fn push_device_list(&self, reply: HttpReply) {
        push(&self.device_lists, reply);
    }

    pub fn push_device(&self, reply: HttpReply) {
        push(&self.devices, reply);
    }

    pub fn refresh_tokens_used(&self) -> Vec<String> {
        self.refresh_tokens_used.lock().expect("lock should be available").clone()
    }

    pub fn device_list_tokens(&self) -> Vec<String> {
        self.device_list_tokens.lock().expect("lock should be available").clone()
    }

    pub fn device_calls(&self) -> Vec<(String, String)> {
        self.device_calls.lock().expect("lock should be available").clone()
    }
}

fn push(queue: &Mutex<VecDeque<HttpReply>>, reply: HttpReply) {
    queue.lock().expect("lock should be available").push_back(reply);
}

fn pop(queue: &Mutex<VecDeque<HttpReply>>, endpoint: &'static str) -> Result<HttpReply, ClientError> {
    queue
        .lock()
        .expect("lock should be available")
        .pop_front()
        .ok_or_else(|| ClientError::Request {
            endpoint,
            message: "no scripted reply left".to_string(),
        })
}

#[async_trait]
impl WeatherXmClient for ScriptedClient {
    async fn login(&self, _username: &str, _password: &str) -> Result<HttpReply, ClientError> {
        tokio::task::yield_now().await;
        pop(&self.logins, "/auth/login")
    }

    async fn refresh(&self, refresh_token: &str) -> Result<HttpReply, ClientError> {
        self.refresh_tokens_used
            .lock()
            .expect("lock should be available")
            .push(refresh_token.to_string());
        tokio::task::yield_now().await;
        pop(&self.refreshes, "/auth/refresh")
    }

    async fn list_devices(&self, access_token: &str) -> Result<HttpReply, ClientError> {
        self.device_list_tokens
            .lock()
            .expect("lock should be available")
            .push(access_token.to_string());
        tokio::task::yield_now().await;
        pop(&self.device_lists, "/me/devices")
    }

    async fn device(
        &self,
        access_token: &str,
        device_id: &str,
    ) -> Result<HttpReply, ClientError> {
        self.device_calls
            .lock()
            .expect("lock should be available")
            .push((access_token.to_string(), device_id.to_string()));
        tokio::task::yield_now().await;
        pop(&self.devices, "/me/devices")
    }
}

#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    saved: Arc<Mutex<Vec<(String, CredentialPair)>>>,
    fail: bool,
}

impl MemoryCredentialStore {
    pub fn failing() -> Self {
        Self {
            saved: Arc::default(),
            fail: true,
        }
    }

    pub fn saved(&self) -> Vec<(String, CredentialPair)> {
        self.saved.lock().expect("lock should be available").clone()
    }

    pub fn latest(&self) -> Option<CredentialPair> {
        self.saved().pop().map(|(_, pair)| pair)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save_credentials(
        &self,
        entry_id: &str,
        credentials: &CredentialPair,
    ) -> Result<(), ServiceError> {
        if self.fail {
            return Err(ServiceError::DbLockPoisoned);
        }

        self.saved
            .lock()
            .expect("lock should be available")
            .push((entry_id.to_string(), credentials.clone()));
        Ok(())
    }
}
