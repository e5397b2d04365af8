use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use super::models::{ReadingInput, SensorReading};
use crate::{
    error::{ServiceError, ServiceResult, StoreError},
    evaluator::HistoryWindow,
    store::{KeyPath, RealtimeStore, Subscription},
};

/// History reads never return more than this many entries.
pub const HISTORY_LIMIT: usize = 100;

/// Typed view over the `sensors/` and `history/` areas of the realtime store.
#[derive(Clone)]
pub struct SensorStreamAdapter {
    store: Arc<dyn RealtimeStore>,
}

impl SensorStreamAdapter {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    /// Latest reading of one sensor; `None` if it never reported.
    pub async fn latest(&self, owner: &str, sensor_id: &str) -> Result<Option<SensorReading>, StoreError> {
        let raw = self.store.get(&KeyPath::sensor(owner, sensor_id)).await?;
        Ok(raw.and_then(|v| SensorReading::from_value(sensor_id, &v)))
    }

    /// Live latest reading of one sensor. `None` values mean "no data".
    ///
    /// Subscribe again (and drop this one) when the owner or sensor changes.
    pub async fn subscribe_latest(
        &self,
        owner: &str,
        sensor_id: &str,
    ) -> Subscription<Option<SensorReading>> {
        let rx = self.store.subscribe(&KeyPath::sensor(owner, sensor_id)).await;
        let sensor_id = sensor_id.to_owned();
        Subscription::map(rx, move |raw: &Option<Value>| {
            raw.as_ref()
                .and_then(|v| SensorReading::from_value(&sensor_id, v))
        })
    }

    /// Every sensor of `owner` that has a usable latest reading, by sensor id.
    pub async fn list_sensors(&self, owner: &str) -> Result<Vec<SensorReading>, StoreError> {
        let raw = self.store.get(&KeyPath::sensors(owner)).await?;
        let mut readings: Vec<SensorReading> = readings_by_sensor(raw.as_ref()).into_values().collect();
        readings.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        Ok(readings)
    }

    /// Live map of sensor id → latest reading for all of `owner`'s sensors.
    pub async fn subscribe_all(&self, owner: &str) -> Subscription<HashMap<String, SensorReading>> {
        let rx = self.store.subscribe(&KeyPath::sensors(owner)).await;
        Subscription::map(rx, |raw: &Option<Value>| readings_by_sensor(raw.as_ref()))
    }

    /// The most recent [`HISTORY_LIMIT`] history entries, oldest capture first.
    ///
    /// Entries with unusable timestamps are included and sort first.
    pub async fn recent_history(&self, owner: &str, sensor_id: &str) -> Result<Vec<SensorReading>, StoreError> {
        let entries = self
            .store
            .last_children(&KeyPath::history(owner, sensor_id), HISTORY_LIMIT)
            .await?;
        let mut readings: Vec<SensorReading> = entries
            .iter()
            .filter_map(|(_, v)| SensorReading::from_value(sensor_id, v))
            .collect();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    /// Recent history restricted to `window`.
    pub async fn history(
        &self,
        owner: &str,
        sensor_id: &str,
        window: HistoryWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let recent = self.recent_history(owner, sensor_id).await?;
        Ok(window.filter(recent, now))
    }

    /// Producer side: records `input` as the sensor's latest state and
    /// appends it to history.
    pub async fn publish(
        &self,
        owner: &str,
        sensor_id: &str,
        input: ReadingInput,
        now: DateTime<Utc>,
    ) -> ServiceResult<SensorReading> {
        if sensor_id.trim().is_empty() {
            return Err(ServiceError::Validation("sensor id must not be empty".into()));
        }
        let payload = input.into_payload(owner, sensor_id, now);
        let value = serde_json::to_value(&payload).map_err(|source| StoreError::Malformed {
            path: KeyPath::sensor(owner, sensor_id).to_string(),
            source,
        })?;
        let reading = SensorReading::from_payload(sensor_id, payload)
            .ok_or_else(|| ServiceError::Validation("reading needs humidity and temperature".into()))?;

        self.store.set(&KeyPath::sensor(owner, sensor_id), value.clone()).await?;
        self.store.push(&KeyPath::history(owner, sensor_id), value).await?;

        info!(
            owner = %owner,
            sensor_id = %sensor_id,
            humidity = reading.humidity,
            temperature = reading.temperature,
            "Sensor reading recorded"
        );
        Ok(reading)
    }
}

fn readings_by_sensor(raw: Option<&Value>) -> HashMap<String, SensorReading> {
    raw.and_then(Value::as_object)
        .map(|sensors| {
            sensors
                .iter()
                .filter_map(|(id, v)| SensorReading::from_value(id, v).map(|r| (id.clone(), r)))
                .collect()
        })
        .unwrap_or_default()
}
