use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::evaluator::{DEFAULT_HUMIDITY_THRESHOLD, DEFAULT_TEMPERATURE_THRESHOLD};

/// Per-owner preferences stored at `settings/{owner}`.
///
/// Missing fields take their default, so a partial record (or none at all)
/// still yields a complete value. Thresholds are accepted as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub recording_interval_minutes: u32,
    pub push_notifications: bool,
    pub low_humidity_alert: bool,
    pub high_temperature_alert: bool,
    pub watering_reminder: bool,
    /// Local time of day, `HH:MM`.
    pub reminder_time: String,
    /// Percent; readings strictly below alert.
    pub humidity_threshold: f64,
    /// °C; readings strictly above alert.
    pub temperature_threshold: f64,
    pub calibration: Calibration,
    pub retention_days: u32,
    pub temperature_unit: TemperatureUnit,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recording_interval_minutes: 60,
            push_notifications: true,
            low_humidity_alert: true,
            high_temperature_alert: true,
            watering_reminder: true,
            reminder_time: "08:00".to_owned(),
            humidity_threshold: DEFAULT_HUMIDITY_THRESHOLD,
            temperature_threshold: DEFAULT_TEMPERATURE_THRESHOLD,
            calibration: Calibration::default(),
            retention_days: 90,
            temperature_unit: TemperatureUnit::default(),
            theme: Theme::default(),
        }
    }
}

impl Settings {
    /// Humidity as shown to the user.
    pub fn display_humidity(&self, raw: f64) -> f64 {
        raw + self.calibration.humidity_offset
    }

    /// Temperature as shown to the user, offset then converted.
    pub fn display_temperature(&self, raw_celsius: f64) -> f64 {
        self.temperature_unit
            .from_celsius(raw_celsius + self.calibration.temperature_offset)
    }

    pub fn toggle(&self, toggle: SettingToggle) -> bool {
        match toggle {
            SettingToggle::PushNotifications => self.push_notifications,
            SettingToggle::LowHumidityAlert => self.low_humidity_alert,
            SettingToggle::HighTemperatureAlert => self.high_temperature_alert,
            SettingToggle::WateringReminder => self.watering_reminder,
        }
    }

    pub fn set_toggle(&mut self, toggle: SettingToggle, enabled: bool) {
        let field = match toggle {
            SettingToggle::PushNotifications => &mut self.push_notifications,
            SettingToggle::LowHumidityAlert => &mut self.low_humidity_alert,
            SettingToggle::HighTemperatureAlert => &mut self.high_temperature_alert,
            SettingToggle::WateringReminder => &mut self.watering_reminder,
        };
        *field = enabled;
    }
}

/// Offsets added to raw sensor values before display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Calibration {
    pub humidity_offset: f64,
    pub temperature_offset: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// The boolean preferences that can be flipped one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SettingToggle {
    PushNotifications,
    LowHumidityAlert,
    HighTemperatureAlert,
    WateringReminder,
}

impl SettingToggle {
    /// Key of the field inside the stored record.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::PushNotifications => "pushNotifications",
            Self::LowHumidityAlert => "lowHumidityAlert",
            Self::HighTemperatureAlert => "highTemperatureAlert",
            Self::WateringReminder => "wateringReminder",
        }
    }
}
