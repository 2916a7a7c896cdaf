use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::snapshot::Snapshot;

pub const CELSIUS: &str = "°C";
pub const PERCENTAGE: &str = "%";
pub const METERS_PER_SECOND: &str = "m/s";
pub const DEGREES: &str = "°";
pub const WATTS_PER_SQUARE_METER: &str = "W/m²";
pub const MILLIMETERS: &str = "mm";
pub const HECTOPASCAL: &str = "hPa";
pub const WXM: &str = "WXM";

pub const MANUFACTURER: &str = "WeatherXM";
pub const STATION_MODEL: &str = "WeatherXM Station";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Temperature,
    Humidity,
    Pressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub key: &'static str,
    pub unit: Option<&'static str>,
    pub name: &'static str,
    pub precision: Option<u32>,
    pub device_class: Option<DeviceClass>,
}

const fn field(
    key: &'static str,
    unit: Option<&'static str>,
    name: &'static str,
    precision: Option<u32>,
    device_class: Option<DeviceClass>,
) -> FieldDescriptor {
    FieldDescriptor {
        key,
        unit,
        name,
        precision,
        device_class,
    }
}

pub const FIELDS: &[FieldDescriptor] = &[
    field(
        "temperature",
        Some(CELSIUS),
        "Temperature",
        None,
        Some(DeviceClass::Temperature),
    ),
    field(
        "humidity",
        Some(PERCENTAGE),
        "Humidity",
        None,
        Some(DeviceClass::Humidity),
    ),
    field("wind_speed", Some(METERS_PER_SECOND), "Wind Speed", None, None),
    field("wind_gust", Some(METERS_PER_SECOND), "Wind Gust", None, None),
    field("wind_direction", Some(DEGREES), "Wind Direction", None, None),
    field(
        "solar_irradiance",
        Some(WATTS_PER_SQUARE_METER),
        "Solar Irradiance",
        Some(1),
        None,
    ),
    field("uv_index", None, "UV Index", None, None),
    field("precipitation", Some(MILLIMETERS), "Precipitation", None, None),
    field(
        "pressure",
        Some(HECTOPASCAL),
        "Pressure",
        Some(1),
        Some(DeviceClass::Pressure),
    ),
    field(
        "dew_point",
        Some(CELSIUS),
        "Dew Point",
        Some(1),
        Some(DeviceClass::Temperature),
    ),
    field(
        "precipitation_accumulated",
        Some(MILLIMETERS),
        "Precipitation Accumulated",
        Some(1),
        None,
    ),
    field(
        "feels_like",
        Some(CELSIUS),
        "Feels Like",
        None,
        Some(DeviceClass::Temperature),
    ),
    field("actual_reward", Some(WXM), "Actual Reward", Some(2), None),
    field("total_rewards", Some(WXM), "Total Rewards", None, None),
];

pub fn find_field(key: &str) -> Option<&'static FieldDescriptor> {
    FIELDS.iter().find(|field| field.key == key)
}

impl FieldDescriptor {
    pub fn entity_name(&self) -> String {
        format!("WeatherXM {}", self.name)
    }

    pub fn unique_id(&self, device_id: &str) -> String {
        format!("{device_id}_{}", self.key)
    }

    pub fn native_value(&self, snapshot: Option<&Snapshot>) -> Option<Value> {
        let value = snapshot?.lookup(self.key)?;
        if value.is_null() {
            return None;
        }

        Some(match self.precision {
            Some(precision) => round_value(value, precision),
            None => value.clone(),
        })
    }
}

pub fn round_value(value: &Value, precision: u32) -> Value {
    let Some(number) = parse_f64(value) else {
        return value.clone();
    };

    // decimal formatting is correctly rounded, exact ties go to even
    format!("{number:.prec$}", prec = precision as usize)
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| value.clone())
}

fn parse_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    number.is_finite().then_some(number)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

impl DeviceInfo {
    pub fn for_station(device_id: &str) -> Self {
        Self {
            identifiers: vec![("weatherxm".to_string(), device_id.to_string())],
            name: STATION_MODEL,
            manufacturer: MANUFACTURER,
            model: STATION_MODEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    pub unique_id: String,
    pub key: &'static str,
    pub name: String,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state: Option<Value>,
    pub available: bool,
    pub attributes: Map<String, Value>,
    pub device: DeviceInfo,
}

impl SensorState {
    pub fn observe(
        field: &FieldDescriptor,
        device_id: &str,
        snapshot: Option<&Snapshot>,
        available: bool,
    ) -> Self {
        Self {
            unique_id: field.unique_id(device_id),
            key: field.key,
            name: field.entity_name(),
            unit: field.unit,
            device_class: field.device_class,
            state: field.native_value(snapshot),
            available,
            attributes: snapshot.map(Snapshot::attributes).unwrap_or_default(),
            device: DeviceInfo::for_station(device_id),
        }
    }
}

pub fn sensor_states(
    device_id: &str,
    snapshot: Option<&Snapshot>,
    available: bool,
) -> Vec<SensorState> {
    FIELDS
        .iter()
        .map(|field| SensorState::observe(field, device_id, snapshot, available))
        .collect()
}
