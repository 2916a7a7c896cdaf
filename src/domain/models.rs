use serde_json::Value;

use crate::domain::credentials::CredentialPair;

#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    pub id: String,
    pub title: String,
    pub station_id: String,
    pub station_name: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: String,
    pub updated_at: String,
}

impl EntryRecord {
    pub fn credentials(&self) -> CredentialPair {
        CredentialPair::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEntryRecord {
    pub title: String,
    pub station_id: String,
    pub station_name: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSummary {
    pub id: String,
    pub name: String,
}

pub fn parse_station_list(payload: &Value) -> Option<Vec<StationSummary>> {
    let devices = payload.as_array()?;

    Some(
        devices
            .iter()
            .filter_map(|device| {
                let id = device.get("id")?.as_str()?;
                let name = device.get("name")?.as_str()?;
                Some(StationSummary {
                    id: id.to_string(),
                    name: name.to_string(),
                })
            })
            .collect(),
    )
}
