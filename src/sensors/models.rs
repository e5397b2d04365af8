use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Wire payload
//
// Devices write their latest state to `sensors/{owner}/{sensor_id}` and append
// the same shape to `history/{owner}/{sensor_id}/{entry_id}`:
//
//   { "sensorId": "s1", "humidity": 61.5, "temperature": 23.4,
//     "light": 70, "soilMoisture": 38, "timestamp": 1700000000000,
//     "userId": "owner" }
//
// Older firmware writes `orchidId` instead of `sensorId`. `timestamp` is epoch
// milliseconds; some devices occasionally write 0, a string, or nothing.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorPayload {
    #[serde(default, alias = "orchidId", skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
    #[serde(default)]
    pub soil_moisture: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Epoch-millisecond timestamp, or `None` if missing, non-numeric, or not
/// strictly positive.
pub fn parse_timestamp(raw: Option<&Value>) -> Option<DateTime<Utc>> {
    let millis = match raw? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

// ---------------------------------------------------------------------------
// Normalized reading
// ---------------------------------------------------------------------------

/// One sensor sample in the stable shape the rest of the crate uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorReading {
    pub sensor_id: String,
    pub owner_id: Option<String>,
    /// Relative air humidity, percent.
    pub humidity: f64,
    /// Air temperature, °C.
    pub temperature: f64,
    /// Light level, percent.
    pub light: f64,
    /// Soil moisture, percent.
    pub soil_moisture: f64,
    /// Capture time; `None` when the device wrote an unusable timestamp.
    pub timestamp: Option<DateTime<Utc>>,
}

impl SensorReading {
    /// Normalizes a raw value read from the realtime store.
    ///
    /// Returns `None` when the value is not a reading at all (not an object,
    /// wrong field types, or no humidity/temperature).
    pub fn from_value(sensor_id: &str, value: &Value) -> Option<Self> {
        let payload: SensorPayload = match serde_json::from_value(value.clone()) {
            Ok(p) => p,
            Err(e) => {
                debug!(sensor_id = %sensor_id, error = %e, "Ignoring malformed sensor payload");
                return None;
            }
        };
        Self::from_payload(sensor_id, payload)
    }

    pub fn from_payload(sensor_id: &str, payload: SensorPayload) -> Option<Self> {
        let (Some(humidity), Some(temperature)) = (payload.humidity, payload.temperature) else {
            debug!(sensor_id = %sensor_id, "Sensor payload lacks humidity or temperature");
            return None;
        };
        Some(Self {
            sensor_id: sensor_id.to_owned(),
            owner_id: payload.user_id,
            humidity,
            temperature,
            light: payload.light.unwrap_or(0.0),
            soil_moisture: payload.soil_moisture.unwrap_or(0.0),
            timestamp: parse_timestamp(payload.timestamp.as_ref()),
        })
    }
}

/// Body of `POST /users/{owner}/sensors/{sensor_id}/readings`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReadingInput {
    pub humidity: f64,
    pub temperature: f64,
    #[serde(default)]
    pub light: Option<f64>,
    #[serde(default)]
    pub soil_moisture: Option<f64>,
    /// Epoch milliseconds; the server clock is used when absent.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl ReadingInput {
    pub fn into_payload(self, owner: &str, sensor_id: &str, now: DateTime<Utc>) -> SensorPayload {
        SensorPayload {
            sensor_id: Some(sensor_id.to_owned()),
            humidity: Some(self.humidity),
            temperature: Some(self.temperature),
            light: self.light,
            soil_moisture: self.soil_moisture,
            timestamp: Some(Value::from(
                self.timestamp.unwrap_or_else(|| now.timestamp_millis()),
            )),
            user_id: Some(owner.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn full_payload_normalizes() {
        let raw = json!({
            "orchidId": "s1",
            "humidity": 61.5,
            "temperature": 23.4,
            "light": 70,
            "soilMoisture": 38,
            "timestamp": 1_700_000_000_000_i64,
            "userId": "alice"
        });
        let r = SensorReading::from_value("s1", &raw).unwrap();
        assert_eq!(r.sensor_id, "s1");
        assert_eq!(r.owner_id.as_deref(), Some("alice"));
        assert_eq!(r.humidity, 61.5);
        assert_eq!(r.temperature, 23.4);
        assert_eq!(r.light, 70.0);
        assert_eq!(r.soil_moisture, 38.0);
        assert_eq!(r.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn optional_channels_default_to_zero() {
        let r = SensorReading::from_value("s1", &json!({"humidity": 50, "temperature": 20})).unwrap();
        assert_eq!(r.light, 0.0);
        assert_eq!(r.soil_moisture, 0.0);
        assert!(r.timestamp.is_none());
    }

    #[test]
    fn unusable_timestamps_become_none() {
        for ts in [json!(0), json!(-5), json!("10:00 AM"), json!(null), json!({"x": 1})] {
            let raw = json!({"humidity": 50, "temperature": 20, "timestamp": ts.clone()});
            let r = SensorReading::from_value("s1", &raw).unwrap();
            assert!(r.timestamp.is_none(), "timestamp {ts} should be rejected");
        }
    }

    #[test]
    fn float_timestamp_is_accepted() {
        let raw = json!({"humidity": 50, "temperature": 20, "timestamp": 1_700_000_000_000.0});
        let r = SensorReading::from_value("s1", &raw).unwrap();
        assert_eq!(r.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn non_readings_are_rejected() {
        assert!(SensorReading::from_value("s1", &json!(42)).is_none());
        assert!(SensorReading::from_value("s1", &json!({"humidity": 50})).is_none());
        assert!(SensorReading::from_value("s1", &json!({"humidity": "wet", "temperature": 1})).is_none());
    }

    #[test]
    fn input_uses_clock_when_timestamp_missing() {
        let now = DateTime::from_timestamp_millis(1_700_000_123_000).unwrap();
        let input = ReadingInput {
            humidity: 45.0,
            temperature: 27.0,
            light: None,
            soil_moisture: Some(30.0),
            timestamp: None,
        };
        let payload = input.into_payload("alice", "s1", now);
        let r = SensorReading::from_payload("s1", payload).unwrap();
        assert_eq!(r.timestamp, Some(now));
        assert_eq!(r.owner_id.as_deref(), Some("alice"));
        assert_eq!(r.soil_moisture, 30.0);
    }
}
