use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    plants::models::{Plant, WateringRecord},
    sensors::models::SensorReading,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthDto {
    pub status: String,
    /// `memory` or `postgres`
    pub document_store: String,
}

// ---------------------------------------------------------------------------
// Plants
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WateredRequest {
    /// Defaults to the current time.
    #[serde(default)]
    pub watered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WateredResponse {
    pub plant: Plant,
    pub record: WateringRecord,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkSensorRequest {
    pub sensor_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WateringRecordsQuery {
    /// Only records of this plant.
    pub plant_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorStatusDto {
    pub reading: SensorReading,
    /// Reported within the last two minutes.
    pub online: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LatestQuery {
    /// Wait up to this many seconds for a newer reading.
    pub wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// `all`, `1h`, `24h`, `7d` or `30d`; defaults to `all`.
    pub window: Option<String>,
}

// ---------------------------------------------------------------------------
// Settings and devices
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClaimRequest {
    pub owner: String,
}
