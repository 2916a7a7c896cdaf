use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::credentials::CredentialPair;
use crate::domain::models::{EntryRecord, NewEntryRecord};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

pub trait EntryQueryHandler {
    fn get_entry(&self, entry_id: &str) -> Result<Option<EntryRecord>, ServiceError>;
    fn find_entry_by_station(
        &self,
        station_id: &str,
    ) -> Result<Option<EntryRecord>, ServiceError>;
    fn list_entries(&self) -> Result<Vec<EntryRecord>, ServiceError>;
    fn get_schema_version(&self) -> Result<u32, ServiceError>;
}

pub trait EntryCommandHandler {
    fn create_entry(&self, new_entry: &NewEntryRecord) -> Result<String, ServiceError>;
    fn remove_entry(&self, entry_id: &str) -> Result<bool, ServiceError>;
}

pub trait CredentialStore: Send + Sync + 'static {
    fn save_credentials(
        &self,
        entry_id: &str,
        credentials: &CredentialPair,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SqliteEntryService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteEntryService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl EntryQueryHandler for SqliteEntryService {
    fn get_entry(&self, entry_id: &str) -> Result<Option<EntryRecord>, ServiceError> {
        self.with_connection(|connection| db::get_entry(connection, entry_id))
    }

    fn find_entry_by_station(
        &self,
        station_id: &str,
    ) -> Result<Option<EntryRecord>, ServiceError> {
        self.with_connection(|connection| db::find_entry_by_station(connection, station_id))
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, ServiceError> {
        self.with_connection(db::list_entries)
    }

    fn get_schema_version(&self) -> Result<u32, ServiceError> {
        self.with_connection(db::schema_version)
    }
}

impl EntryCommandHandler for SqliteEntryService {
    fn create_entry(&self, new_entry: &NewEntryRecord) -> Result<String, ServiceError> {
        self.with_connection(|connection| db::insert_entry(connection, new_entry))
    }

    fn remove_entry(&self, entry_id: &str) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::delete_entry(connection, entry_id))
    }
}

impl CredentialStore for SqliteEntryService {
    fn save_credentials(
        &self,
        entry_id: &str,
        credentials: &CredentialPair,
    ) -> Result<(), ServiceError> {
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_connection(|connection| {
            db::update_entry_credentials(connection, entry_id, credentials, &updated_at)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{CredentialStore, EntryCommandHandler, EntryQueryHandler, SqliteEntryService};
    use crate::domain::credentials::CredentialPair;
    use crate::test_support::{open_test_connection, sample_new_entry};

    fn service(name: &str) -> SqliteEntryService {
        SqliteEntryService::new(Arc::new(Mutex::new(open_test_connection(name))))
    }

    #[test]
    fn persisted_credentials_survive_reload() {
        let service = service("service-credentials.sqlite");
        let entry_id = service
            .create_entry(&sample_new_entry("station-a"))
            .expect("entry should be created");

        service
            .save_credentials(&entry_id, &CredentialPair::new("access-2", "refresh-2"))
            .expect("credentials should persist");

        let reloaded = service
            .find_entry_by_station("station-a")
            .expect("query should succeed")
            .expect("entry should exist");
        assert_eq!(
            reloaded.credentials(),
            CredentialPair::new("access-2", "refresh-2")
        );
    }

    #[test]
    fn saving_credentials_for_removed_entry_fails() {
        let service = service("service-removed.sqlite");
        let entry_id = service
            .create_entry(&sample_new_entry("station-a"))
            .expect("entry should be created");
        assert!(service.remove_entry(&entry_id).expect("remove should succeed"));

        let result = service.save_credentials(&entry_id, &CredentialPair::new("a", "r"));

        assert!(result.is_err());
        assert_eq!(service.get_entry(&entry_id).expect("query should succeed"), None);
    }
}
