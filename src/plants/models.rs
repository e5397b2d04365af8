use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A potted plant owned by one user.
///
/// `next_watering` is `None` only for records written before a first watering
/// date was computed; such plants are never reported as due.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Plant {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub species: String,
    pub location: String,
    /// Watering interval in whole days, always positive.
    pub watering_interval_days: i32,
    pub last_watered: Option<DateTime<Utc>>,
    pub next_watering: Option<DateTime<Utc>>,
    /// Key of the linked sensor under `sensors/{owner}/`.
    pub sensor_id: Option<String>,
    /// Last known environment, shown when no live reading exists.
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
    pub light: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a plant.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPlant {
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub location: String,
    pub watering_interval_days: i32,
    #[serde(default)]
    pub sensor_id: Option<String>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
}

/// Partial update of a plant. Absent fields are left untouched.
///
/// `sensor_id: ""` unlinks the sensor.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PlantPatch {
    pub name: Option<String>,
    pub species: Option<String>,
    pub location: Option<String>,
    pub watering_interval_days: Option<i32>,
    pub sensor_id: Option<String>,
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
    pub light: Option<f64>,
}

/// One "watered" event. Kept after its plant is deleted.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct WateringRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub plant_id: Uuid,
    pub plant_name: String,
    pub watered_at: DateTime<Utc>,
    pub notes: Option<String>,
}
