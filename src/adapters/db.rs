use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::domain::credentials::CredentialPair;
use crate::domain::models::{EntryRecord, NewEntryRecord};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS config_entries (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    station_id TEXT NOT NULL,
    station_name TEXT NOT NULL,
    username TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_config_entries_station_id
ON config_entries (station_id);
"#,
)];

const ENTRY_COLUMNS: &str = "id, title, station_id, station_name, username, access_token, refresh_token, created_at, updated_at";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("config entry {0} not found")]
    EntryNotFound(String),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<EntryRecord> {
    Ok(EntryRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        station_id: row.get(2)?,
        station_name: row.get(3)?,
        username: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn insert_entry(connection: &Connection, new_entry: &NewEntryRecord) -> Result<String, DbError> {
    let id = uuid::Uuid::new_v4().to_string();

    connection.execute(
        "INSERT INTO config_entries (id, title, station_id, station_name, username, access_token, refresh_token, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            new_entry.title,
            new_entry.station_id,
            new_entry.station_name,
            new_entry.username,
            new_entry.access_token,
            new_entry.refresh_token,
            new_entry.created_at,
        ],
    )?;

    Ok(id)
}

pub fn get_entry(connection: &Connection, entry_id: &str) -> Result<Option<EntryRecord>, DbError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM config_entries WHERE id = ?1");
    connection
        .query_row(&sql, params![entry_id], map_entry)
        .optional()
        .map_err(DbError::from)
}

pub fn find_entry_by_station(
    connection: &Connection,
    station_id: &str,
) -> Result<Option<EntryRecord>, DbError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM config_entries WHERE station_id = ?1");
    connection
        .query_row(&sql, params![station_id], map_entry)
        .optional()
        .map_err(DbError::from)
}

pub fn list_entries(connection: &Connection) -> Result<Vec<EntryRecord>, DbError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM config_entries ORDER BY created_at ASC, id ASC");
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map([], map_entry)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    Ok(entries)
}

pub fn update_entry_credentials(
    connection: &Connection,
    entry_id: &str,
    credentials: &CredentialPair,
    updated_at: &str,
) -> Result<(), DbError> {
    let changed = connection.execute(
        "UPDATE config_entries SET access_token = ?1, refresh_token = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            credentials.access_token,
            credentials.refresh_token,
            updated_at,
            entry_id,
        ],
    )?;

    if changed == 0 {
        return Err(DbError::EntryNotFound(entry_id.to_string()));
    }

    Ok(())
}

pub fn delete_entry(connection: &Connection, entry_id: &str) -> Result<bool, DbError> {
    let changed = connection.execute(
        "DELETE FROM config_entries WHERE id = ?1",
        params![entry_id],
    )?;
    Ok(changed > 0)
}
