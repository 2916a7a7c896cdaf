use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const CURRENT_WEATHER_KEY: &str = "current_weather";
const REWARDS_KEY: &str = "rewards";
const ERROR_KEY: &str = "error";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub current_weather: Map<String, Value>,
    pub rewards: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("invalid JSON from WeatherXM API: {reason}")]
    InvalidJson { reason: String, body: String },
    #[error("device data must be a JSON object")]
    InvalidPayloadType,
    #[error("error from WeatherXM API: {0}")]
    Api(String),
    #[error("unexpected data format: missing {0}")]
    MissingSection(&'static str),
    #[error("unexpected data format: {0} must be an object")]
    InvalidSection(&'static str),
}

impl Snapshot {
    pub fn parse(body: &str) -> Result<Self, FormatError> {
        let payload: Value = serde_json::from_str(body).map_err(|err| FormatError::InvalidJson {
            reason: err.to_string(),
            body: body.to_string(),
        })?;

        Self::from_value(payload)
    }

    pub fn from_value(payload: Value) -> Result<Self, FormatError> {
        let Value::Object(mut object) = payload else {
            return Err(FormatError::InvalidPayloadType);
        };

        if let Some(error) = object.get(ERROR_KEY) {
            let message = match error {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return Err(FormatError::Api(message));
        }

        let current_weather = take_section(&mut object, CURRENT_WEATHER_KEY)?;
        let rewards = take_section(&mut object, REWARDS_KEY)?;

        Ok(Self {
            current_weather,
            rewards,
            extra: object,
        })
    }

    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.current_weather
            .get(key)
            .or_else(|| self.rewards.get(key))
    }

    pub fn attributes(&self) -> Map<String, Value> {
        let mut attributes = self.current_weather.clone();
        attributes.extend(
            self.rewards
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        attributes
    }
}

fn take_section(
    object: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Map<String, Value>, FormatError> {
    match object.remove(key) {
        Some(Value::Object(section)) => Ok(section),
        Some(_) => Err(FormatError::InvalidSection(key)),
        None => Err(FormatError::MissingSection(key)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FormatError, Snapshot};

    fn device_body() -> serde_json::Value {
        json!({
            "id": "device-1",
            "name": "Rainy Garden",
            "current_weather": {
                "temperature": 21.4,
                "pressure": 1013.456,
                "total_rewards": 3.0
            },
            "rewards": {
                "actual_reward": "0.12345",
                "total_rewards": 58.2
            }
        })
    }

    #[test]
    fn keeps_body_verbatim_when_serialized_back() {
        let body = device_body();
        let snapshot = Snapshot::parse(&body.to_string()).expect("body should be valid");

        assert_eq!(
            serde_json::to_value(&snapshot).expect("snapshot should serialize"),
            body
        );
    }

    #[test]
    fn rejects_body_carrying_api_error() {
        let body = json!({
            "error": "device not found",
            "current_weather": {},
            "rewards": {}
        });

        assert_eq!(
            Snapshot::from_value(body),
            Err(FormatError::Api("device not found".to_string()))
        );
    }

    #[test]
    fn rejects_body_with_missing_sections() {
        assert_eq!(
            Snapshot::from_value(json!({"rewards": {}})),
            Err(FormatError::MissingSection("current_weather"))
        );
        assert_eq!(
            Snapshot::from_value(json!({"current_weather": {}})),
            Err(FormatError::MissingSection("rewards"))
        );
    }

    #[test]
    fn rejects_non_object_sections_and_payloads() {
        assert_eq!(
            Snapshot::from_value(json!({"current_weather": [], "rewards": {}})),
            Err(FormatError::InvalidSection("current_weather"))
        );
        assert_eq!(
            Snapshot::from_value(json!(["current_weather", "rewards"])),
            Err(FormatError::InvalidPayloadType)
        );
    }

    #[test]
    fn reports_unparsable_body() {
        let result = Snapshot::parse("{\"current_weather\":");

        assert!(matches!(
            result,
            Err(FormatError::InvalidJson { ref body, .. }) if body == "{\"current_weather\":"
        ));
    }

    #[test]
    fn looks_up_current_weather_before_rewards() {
        let snapshot = Snapshot::from_value(device_body()).expect("body should be valid");

        assert_eq!(snapshot.lookup("total_rewards"), Some(&json!(3.0)));
        assert_eq!(snapshot.lookup("actual_reward"), Some(&json!("0.12345")));
        assert_eq!(snapshot.lookup("missing"), None);
    }

    #[test]
    fn merges_sections_into_attributes() {
        let snapshot = Snapshot::from_value(device_body()).expect("body should be valid");
        let attributes = snapshot.attributes();

        assert_eq!(attributes["temperature"], json!(21.4));
        assert_eq!(attributes["total_rewards"], json!(58.2));
        assert_eq!(attributes.len(), 4);
    }

    #[test]
    fn same_body_twice_yields_identical_snapshots() {
        let body = device_body().to_string();

        assert_eq!(Snapshot::parse(&body), Snapshot::parse(&body));
    }
}
