use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    alerts::AlertKind,
    evaluator::{self, HumidityStatus, WateringStatus},
    plants::models::Plant,
    sensors::models::SensorReading,
    settings::{models::TemperatureUnit, Settings},
};

/// A plant placed on one of the alert lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertedPlant {
    pub plant_id: Uuid,
    pub plant_name: String,
    pub message: String,
}

/// The three category lists. A plant may sit on several at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertLists {
    pub watering_due: Vec<AlertedPlant>,
    pub low_humidity: Vec<AlertedPlant>,
    pub high_temperature: Vec<AlertedPlant>,
}

impl AlertLists {
    pub fn is_empty(&self) -> bool {
        self.watering_due.is_empty() && self.low_humidity.is_empty() && self.high_temperature.is_empty()
    }

    /// Every `(category, plant)` pair.
    pub fn entries(&self) -> impl Iterator<Item = (AlertKind, &AlertedPlant)> {
        self.watering_due
            .iter()
            .map(|p| (AlertKind::WateringDue, p))
            .chain(self.low_humidity.iter().map(|p| (AlertKind::LowHumidity, p)))
            .chain(self.high_temperature.iter().map(|p| (AlertKind::HighTemperature, p)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "banner", rename_all = "snake_case")]
pub enum Banner {
    WateringDue { count: usize },
    LowHumidity { count: usize },
    HighTemperature { count: usize },
    AllNominal,
}

/// Display values for one plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlantCard {
    pub plant_id: Uuid,
    pub name: String,
    pub species: String,
    pub location: String,
    pub sensor_id: Option<String>,
    /// The linked sensor reported within the liveness window.
    pub online: bool,
    /// Values come from a live reading rather than the stored snapshot.
    pub live: bool,
    /// Calibrated percent.
    pub humidity: Option<f64>,
    /// Calibrated, in `temperature_unit`.
    pub temperature: Option<f64>,
    pub temperature_unit: TemperatureUnit,
    pub light: Option<f64>,
    pub humidity_status: HumidityStatus,
    pub watering: WateringStatus,
    pub days_until_watering: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub alerts: AlertLists,
    pub banners: Vec<Banner>,
    pub cards: Vec<PlantCard>,
    pub notifications_enabled: bool,
}

impl DashboardSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        evaluate(&[], &HashMap::new(), &Settings::default(), now)
    }
}

/// One evaluation pass over the current inputs.
///
/// `readings` maps sensor id to its latest reading. Environment alerts only
/// consider plants with a linked sensor that has a reading; the stored
/// per-plant values feed card display only. Alerts compare raw readings
/// against the thresholds; calibration and unit affect display only.
pub fn evaluate(
    plants: &[Plant],
    readings: &HashMap<String, SensorReading>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> DashboardSnapshot {
    let mut alerts = AlertLists::default();
    let mut cards = Vec::with_capacity(plants.len());

    for plant in plants {
        let reading = plant.sensor_id.as_deref().and_then(|id| readings.get(id));

        if settings.watering_reminder && evaluator::is_watering_due(plant, now) {
            alerts.watering_due.push(alerted(plant, watering_message(plant, now)));
        }
        if settings.low_humidity_alert && evaluator::is_low_humidity(reading, settings.humidity_threshold) {
            if let Some(r) = reading {
                let message = format!(
                    "Humidity {:.1}% is below {:.1}%",
                    r.humidity, settings.humidity_threshold
                );
                alerts.low_humidity.push(alerted(plant, message));
            }
        }
        if settings.high_temperature_alert
            && evaluator::is_high_temperature(reading, settings.temperature_threshold)
        {
            if let Some(r) = reading {
                let message = format!(
                    "Temperature {:.1}°C is above {:.1}°C",
                    r.temperature, settings.temperature_threshold
                );
                alerts.high_temperature.push(alerted(plant, message));
            }
        }

        cards.push(card(plant, reading, settings, now));
    }

    let banners = banners(&alerts, !plants.is_empty());
    DashboardSnapshot {
        generated_at: now,
        alerts,
        banners,
        cards,
        notifications_enabled: settings.push_notifications,
    }
}

fn banners(alerts: &AlertLists, any_plants: bool) -> Vec<Banner> {
    let mut banners = Vec::new();
    if !alerts.watering_due.is_empty() {
        banners.push(Banner::WateringDue { count: alerts.watering_due.len() });
    }
    if !alerts.low_humidity.is_empty() {
        banners.push(Banner::LowHumidity { count: alerts.low_humidity.len() });
    }
    if !alerts.high_temperature.is_empty() {
        banners.push(Banner::HighTemperature { count: alerts.high_temperature.len() });
    }
    if banners.is_empty() && any_plants {
        banners.push(Banner::AllNominal);
    }
    banners
}

fn alerted(plant: &Plant, message: String) -> AlertedPlant {
    AlertedPlant {
        plant_id: plant.id,
        plant_name: plant.name.clone(),
        message,
    }
}

fn watering_message(plant: &Plant, now: DateTime<Utc>) -> String {
    match WateringStatus::of(plant, now) {
        WateringStatus::Overdue { days } => format!("{} is {days} day(s) overdue for watering", plant.name),
        _ => format!("{} needs watering today", plant.name),
    }
}

fn card(plant: &Plant, reading: Option<&SensorReading>, settings: &Settings, now: DateTime<Utc>) -> PlantCard {
    let (humidity, temperature, light) = match reading {
        Some(r) => (
            Some(settings.display_humidity(r.humidity)),
            Some(settings.display_temperature(r.temperature)),
            Some(r.light),
        ),
        None => (
            plant.humidity,
            plant.temperature.map(|t| settings.temperature_unit.from_celsius(t)),
            plant.light,
        ),
    };

    PlantCard {
        plant_id: plant.id,
        name: plant.name.clone(),
        species: plant.species.clone(),
        location: plant.location.clone(),
        sensor_id: plant.sensor_id.clone(),
        online: evaluator::is_online(reading, now),
        live: reading.is_some(),
        humidity,
        temperature,
        temperature_unit: settings.temperature_unit,
        light,
        humidity_status: HumidityStatus::of(humidity, settings.humidity_threshold),
        watering: WateringStatus::of(plant, now),
        days_until_watering: plant.next_watering.map(|next| evaluator::days_until(next, now)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn plant(name: &str, sensor: Option<&str>, next_in_days: i64) -> Plant {
        Plant {
            id: Uuid::new_v4(),
            owner_id: "alice".into(),
            name: name.into(),
            species: "Phalaenopsis".into(),
            location: String::new(),
            watering_interval_days: 7,
            last_watered: Some(t0() - Duration::days(7 - next_in_days)),
            next_watering: Some(t0() + Duration::days(next_in_days)),
            sensor_id: sensor.map(str::to_owned),
            humidity: Some(64.0),
            temperature: Some(21.0),
            light: Some(70.0),
            created_at: t0() - Duration::days(30),
        }
    }

    fn reading(sensor: &str, humidity: f64, temperature: f64, at: DateTime<Utc>) -> SensorReading {
        SensorReading {
            sensor_id: sensor.into(),
            owner_id: Some("alice".into()),
            humidity,
            temperature,
            light: 80.0,
            soil_moisture: 0.0,
            timestamp: Some(at),
        }
    }

    fn readings(list: Vec<SensorReading>) -> HashMap<String, SensorReading> {
        list.into_iter().map(|r| (r.sensor_id.clone(), r)).collect()
    }

    #[test]
    fn low_humidity_only() {
        let plants = vec![plant("Rosa", Some("s1"), 3)];
        let snap = evaluate(
            &plants,
            &readings(vec![reading("s1", 45.0, 24.0, t0())]),
            &Settings::default(),
            t0(),
        );

        assert_eq!(snap.alerts.low_humidity.len(), 1);
        assert!(snap.alerts.high_temperature.is_empty());
        assert!(snap.alerts.watering_due.is_empty());
        assert_eq!(snap.banners, vec![Banner::LowHumidity { count: 1 }]);
    }

    #[test]
    fn plant_can_be_on_several_lists() {
        let plants = vec![plant("Rosa", Some("s1"), -1)];
        let snap = evaluate(
            &plants,
            &readings(vec![reading("s1", 45.0, 27.0, t0())]),
            &Settings::default(),
            t0(),
        );

        assert_eq!(
            snap.banners,
            vec![
                Banner::WateringDue { count: 1 },
                Banner::LowHumidity { count: 1 },
                Banner::HighTemperature { count: 1 },
            ]
        );
        assert_eq!(snap.alerts.entries().count(), 3);
        assert!(snap.alerts.watering_due[0].message.contains("1 day(s) overdue"));
    }

    #[test]
    fn toggles_gate_their_lists() {
        let plants = vec![plant("Rosa", Some("s1"), -5)];
        let settings = Settings {
            watering_reminder: false,
            high_temperature_alert: false,
            ..Settings::default()
        };
        let snap = evaluate(
            &plants,
            &readings(vec![reading("s1", 45.0, 30.0, t0())]),
            &settings,
            t0(),
        );

        assert!(snap.alerts.watering_due.is_empty());
        assert!(snap.alerts.high_temperature.is_empty());
        assert_eq!(snap.alerts.low_humidity.len(), 1);
    }

    #[test]
    fn unlinked_or_silent_plants_never_raise_environment_alerts() {
        let mut unlinked = plant("Blanca", None, 3);
        unlinked.humidity = Some(10.0);
        let silent = plant("Lila", Some("s9"), 3);

        let snap = evaluate(&[unlinked, silent], &HashMap::new(), &Settings::default(), t0());
        assert!(snap.alerts.is_empty());
        assert_eq!(snap.banners, vec![Banner::AllNominal]);
        // The stored snapshot still shows on the card.
        assert_eq!(snap.cards[0].humidity, Some(10.0));
        assert_eq!(snap.cards[0].humidity_status, HumidityStatus::Low);
        assert!(!snap.cards[0].live);
    }

    #[test]
    fn no_plants_no_banners() {
        let snap = DashboardSnapshot::empty(t0());
        assert!(snap.banners.is_empty());
        assert!(snap.cards.is_empty());
    }

    #[test]
    fn thresholds_come_from_settings() {
        let plants = vec![plant("Rosa", Some("s1"), 3)];
        let settings = Settings {
            humidity_threshold: 40.0,
            temperature_threshold: 22.0,
            ..Settings::default()
        };
        let snap = evaluate(
            &plants,
            &readings(vec![reading("s1", 45.0, 24.0, t0())]),
            &settings,
            t0(),
        );
        assert!(snap.alerts.low_humidity.is_empty());
        assert_eq!(snap.alerts.high_temperature.len(), 1);
    }

    #[test]
    fn card_uses_calibrated_live_values() {
        let plants = vec![plant("Rosa", Some("s1"), 0)];
        let mut settings = Settings::default();
        settings.calibration.humidity_offset = 5.0;
        settings.temperature_unit = TemperatureUnit::Fahrenheit;

        let snap = evaluate(
            &plants,
            &readings(vec![reading("s1", 48.0, 20.0, t0() - Duration::seconds(150))]),
            &settings,
            t0(),
        );
        let card = &snap.cards[0];
        assert!(card.live);
        assert!(!card.online);
        assert_eq!(card.humidity, Some(53.0));
        assert_eq!(card.temperature, Some(68.0));
        assert_eq!(card.humidity_status, HumidityStatus::Medium);
        assert_eq!(card.watering, WateringStatus::DueToday);
        assert_eq!(card.days_until_watering, Some(0));
        // Alerts still look at the raw 48%.
        assert_eq!(snap.alerts.low_humidity.len(), 1);
    }

    #[test]
    fn notifications_flag_follows_settings() {
        let settings = Settings {
            push_notifications: false,
            ..Settings::default()
        };
        assert!(!evaluate(&[], &HashMap::new(), &settings, t0()).notifications_enabled);
    }
}
