//! Pure watering and environment classification.
//!
//! Nothing here fails: absent inputs (no reading, no due date, malformed
//! timestamps) classify as "not alerting".

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{plants::models::Plant, sensors::models::SensorReading};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Longest accepted watering interval, in days.
pub const MAX_INTERVAL_DAYS: i32 = 36_500;

/// Default low-humidity threshold, percent.
pub const DEFAULT_HUMIDITY_THRESHOLD: f64 = 50.0;

/// Default high-temperature threshold, °C.
pub const DEFAULT_TEMPERATURE_THRESHOLD: f64 = 26.0;

/// A sensor is online while its last reading is younger than this.
pub const LIVENESS_WINDOW_MS: i64 = 120_000;

/// Humidity at or above this (and above the low threshold) is optimal.
pub const OPTIMAL_HUMIDITY: f64 = 60.0;

// ---------------------------------------------------------------------------
// Watering
// ---------------------------------------------------------------------------

/// `true` iff the plant has a due date and it is not in the future.
pub fn is_watering_due(plant: &Plant, now: DateTime<Utc>) -> bool {
    plant.next_watering.is_some_and(|next| next <= now)
}

/// Whole days until `next_watering`, rounded up. Negative when overdue,
/// zero when due within the current day.
pub fn days_until(next_watering: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let diff = (next_watering - now).num_milliseconds();
    let days = diff / MILLIS_PER_DAY;
    if diff % MILLIS_PER_DAY > 0 {
        days + 1
    } else {
        days
    }
}

/// Due date for a plant watered at `watered_at`, or `None` when it falls
/// outside the representable date range.
pub fn next_watering_after(watered_at: DateTime<Utc>, interval_days: i32) -> Option<DateTime<Utc>> {
    let millis = i64::from(interval_days).checked_mul(MILLIS_PER_DAY)?;
    watered_at.checked_add_signed(Duration::try_milliseconds(millis)?)
}

/// Applies a "watered at `watered_at`" event to `plant`.
///
/// Returns `false` and leaves `plant` untouched when the next due date
/// cannot be represented.
#[must_use]
pub fn mark_watered(plant: &mut Plant, watered_at: DateTime<Utc>) -> bool {
    let Some(next) = next_watering_after(watered_at, plant.watering_interval_days) else {
        return false;
    };
    plant.last_watered = Some(watered_at);
    plant.next_watering = Some(next);
    true
}

/// Card label for the watering schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WateringStatus {
    Overdue { days: i64 },
    DueToday,
    DueIn { days: i64 },
    Unscheduled,
}

impl WateringStatus {
    pub fn of(plant: &Plant, now: DateTime<Utc>) -> Self {
        match plant.next_watering.map(|next| days_until(next, now)) {
            None => Self::Unscheduled,
            Some(d) if d < 0 => Self::Overdue { days: -d },
            Some(0) => Self::DueToday,
            Some(d) => Self::DueIn { days: d },
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

pub fn is_low_humidity(reading: Option<&SensorReading>, threshold: f64) -> bool {
    reading.is_some_and(|r| r.humidity < threshold)
}

pub fn is_high_temperature(reading: Option<&SensorReading>, threshold: f64) -> bool {
    reading.is_some_and(|r| r.temperature > threshold)
}

/// `true` iff the reading carries a valid capture time younger than the
/// liveness window.
pub fn is_online(reading: Option<&SensorReading>, now: DateTime<Utc>) -> bool {
    reading
        .and_then(|r| r.timestamp)
        .is_some_and(|ts| (now - ts).num_milliseconds() < LIVENESS_WINDOW_MS)
}

/// Humidity badge shown on plant cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HumidityStatus {
    Unknown,
    Low,
    Medium,
    Optimal,
}

impl HumidityStatus {
    pub fn of(humidity: Option<f64>, low_threshold: f64) -> Self {
        match humidity {
            None => Self::Unknown,
            Some(h) if h < low_threshold => Self::Low,
            Some(h) if h < OPTIMAL_HUMIDITY => Self::Medium,
            Some(_) => Self::Optimal,
        }
    }
}

// ---------------------------------------------------------------------------
// History windows
// ---------------------------------------------------------------------------

/// Time range selectable for sensor history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum HistoryWindow {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
}

impl HistoryWindow {
    pub fn millis(self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::LastHour => Some(3_600_000),
            Self::LastDay => Some(MILLIS_PER_DAY),
            Self::Last7Days => Some(7 * MILLIS_PER_DAY),
            Self::Last30Days => Some(30 * MILLIS_PER_DAY),
        }
    }

    /// A reading with no valid capture time never matches, not even `All`.
    pub fn includes(self, reading: &SensorReading, now: DateTime<Utc>) -> bool {
        let Some(ts) = reading.timestamp else {
            return false;
        };
        match self.millis() {
            None => true,
            Some(window) => ts >= now - Duration::milliseconds(window),
        }
    }

    pub fn filter(self, readings: Vec<SensorReading>, now: DateTime<Utc>) -> Vec<SensorReading> {
        readings
            .into_iter()
            .filter(|r| self.includes(r, now))
            .collect()
    }
}

impl FromStr for HistoryWindow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "1h" => Ok(Self::LastHour),
            "24h" => Ok(Self::LastDay),
            "7d" => Ok(Self::Last7Days),
            "30d" => Ok(Self::Last30Days),
            other => Err(anyhow::anyhow!("unknown history window: {other:?}")),
        }
    }
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::All => "all",
            Self::LastHour => "1h",
            Self::LastDay => "24h",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
        };
        f.write_str(s)
    }
}
