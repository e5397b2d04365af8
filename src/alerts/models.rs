use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Alert category; one per dashboard list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    WateringDue,
    LowHumidity,
    HighTemperature,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WateringDue => "watering_due",
            Self::LowHumidity => "low_humidity",
            Self::HighTemperature => "high_temperature",
        }
    }
}

/// An entry of the alert log at `alerts/{owner}/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// Store key; not part of the stored value.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub plant_id: Uuid,
    pub plant_name: String,
    pub kind: AlertKind,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl AlertRecord {
    /// `None` for entries that do not parse; those are skipped, not reported.
    pub fn from_entry(id: &str, value: &Value) -> Option<Self> {
        let mut record: Self = serde_json::from_value(value.clone()).ok()?;
        record.id = id.to_owned();
        Some(record)
    }
}

/// What the caller supplies when logging an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub plant_id: Uuid,
    pub plant_name: String,
    pub kind: AlertKind,
    pub message: String,
}
