use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use super::evaluate::{evaluate, DashboardSnapshot};
use crate::{
    clock::Clock,
    error::ServiceResult,
    plants::PlantRegistry,
    sensors::SensorStreamAdapter,
    settings::SettingsStore,
    store::Subscription,
};

/// Live dashboard for one owner. Dropping it stops the aggregation task
/// and every subscription it holds.
pub type DashboardHandle = Subscription<DashboardSnapshot>;

/// Combines plants, sensor readings and settings into dashboard snapshots.
#[derive(Clone)]
pub struct DashboardAggregator {
    plants: PlantRegistry,
    sensors: SensorStreamAdapter,
    settings: SettingsStore,
    clock: Arc<dyn Clock>,
    refresh: Duration,
}

impl DashboardAggregator {
    pub fn new(
        plants: PlantRegistry,
        sensors: SensorStreamAdapter,
        settings: SettingsStore,
        clock: Arc<dyn Clock>,
        refresh: Duration,
    ) -> Self {
        Self {
            plants,
            sensors,
            settings,
            clock,
            refresh,
        }
    }

    /// Evaluates once from freshly read inputs.
    pub async fn snapshot(&self, owner: &str) -> ServiceResult<DashboardSnapshot> {
        let plants = self.plants.list(owner).await?;
        let readings = self
            .sensors
            .list_sensors(owner)
            .await?
            .into_iter()
            .map(|r| (r.sensor_id.clone(), r))
            .collect::<HashMap<_, _>>();
        let settings = self.settings.get_or_default(owner).await?;
        Ok(evaluate(&plants, &readings, &settings, self.clock.now()))
    }

    /// Starts re-evaluating on every input change and on every refresh tick.
    ///
    /// The tick exists for time-dependent values (due dates, liveness) that
    /// change without any upstream write.
    pub async fn spawn(&self, owner: &str) -> ServiceResult<DashboardHandle> {
        let mut plants = self.plants.subscribe(owner).await?;
        let mut sensors = self.sensors.subscribe_all(owner).await;
        let mut settings = self.settings.subscribe(owner).await;
        let clock = self.clock.clone();

        let initial = evaluate(&plants.current(), &sensors.current(), &settings.current(), clock.now());
        let (tx, rx) = watch::channel(initial);

        let mut ticker = time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let owner = owner.to_owned();
        info!(owner = %owner, refresh_secs = self.refresh.as_secs(), "Dashboard aggregation started");

        let task = tokio::spawn(async move {
            // The first tick completes immediately; the initial snapshot covers it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    next = plants.changed() => {
                        if next.is_none() {
                            break;
                        }
                    }
                    next = sensors.changed() => {
                        if next.is_none() {
                            break;
                        }
                    }
                    next = settings.changed() => {
                        if next.is_none() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }

                let snapshot = evaluate(&plants.current(), &sensors.current(), &settings.current(), clock.now());
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
            debug!(owner = %owner, "Dashboard aggregation stopped");
        });

        Ok(Subscription::with_task(rx, task))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        clock::ManualClock,
        dashboard::evaluate::Banner,
        plants::models::NewPlant,
        sensors::models::ReadingInput,
        settings::SettingToggle,
        store::{MemoryDocumentStore, MemoryRealtimeStore},
    };

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        plants: PlantRegistry,
        sensors: SensorStreamAdapter,
        settings: SettingsStore,
        aggregator: DashboardAggregator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let realtime = Arc::new(MemoryRealtimeStore::new());
        let plants = PlantRegistry::new(Arc::new(MemoryDocumentStore::new()));
        let sensors = SensorStreamAdapter::new(realtime.clone());
        let settings = SettingsStore::new(realtime);
        let aggregator = DashboardAggregator::new(
            plants.clone(),
            sensors.clone(),
            settings.clone(),
            clock.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            clock,
            plants,
            sensors,
            settings,
            aggregator,
        }
    }

    fn orchid(sensor: Option<&str>) -> NewPlant {
        NewPlant {
            name: "Rosa".into(),
            species: "Phalaenopsis".into(),
            location: String::new(),
            watering_interval_days: 7,
            sensor_id: sensor.map(str::to_owned),
            humidity: None,
            temperature: None,
            light: None,
        }
    }

    /// Waits (bounded) for a snapshot satisfying `pred`.
    async fn wait_for(
        handle: &mut DashboardHandle,
        pred: impl Fn(&DashboardSnapshot) -> bool,
    ) -> DashboardSnapshot {
        for _ in 0..50 {
            let current = handle.current();
            if pred(&current) {
                return current;
            }
            handle.changed().await.expect("aggregator stopped");
        }
        panic!("dashboard never reached the expected state");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_tick_picks_up_clock_changes() {
        let f = fixture();
        f.plants.create("alice", orchid(None), t0()).await.unwrap();

        let mut handle = f.aggregator.spawn("alice").await.unwrap();
        assert_eq!(handle.current().banners, vec![Banner::AllNominal]);

        f.clock.advance(chrono::Duration::days(8));
        let snap = wait_for(&mut handle, |s| !s.alerts.watering_due.is_empty()).await;
        assert_eq!(snap.banners, vec![Banner::WateringDue { count: 1 }]);
        assert_eq!(snap.generated_at, t0() + chrono::Duration::days(8));
    }

    #[tokio::test(start_paused = true)]
    async fn reacts_to_readings_and_settings() {
        let f = fixture();
        f.plants.create("alice", orchid(Some("s1")), t0()).await.unwrap();
        let mut handle = f.aggregator.spawn("alice").await.unwrap();

        let input = ReadingInput {
            humidity: 45.0,
            temperature: 27.0,
            light: None,
            soil_moisture: None,
            timestamp: None,
        };
        f.sensors.publish("alice", "s1", input, t0()).await.unwrap();
        let snap = wait_for(&mut handle, |s| !s.alerts.high_temperature.is_empty()).await;
        assert_eq!(snap.alerts.low_humidity.len(), 1);

        f.settings
            .set_toggle("alice", SettingToggle::HighTemperatureAlert, false)
            .await
            .unwrap();
        let snap = wait_for(&mut handle, |s| s.alerts.high_temperature.is_empty()).await;
        assert_eq!(snap.banners, vec![Banner::LowHumidity { count: 1 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn new_plants_show_up() {
        let f = fixture();
        let mut handle = f.aggregator.spawn("alice").await.unwrap();
        assert!(handle.current().banners.is_empty());

        f.plants.create("alice", orchid(None), t0()).await.unwrap();
        let snap = wait_for(&mut handle, |s| s.cards.len() == 1).await;
        assert_eq!(snap.banners, vec![Banner::AllNominal]);
    }

    #[tokio::test]
    async fn one_shot_snapshot_matches_inputs() {
        let f = fixture();
        f.plants.create("alice", orchid(Some("s1")), t0()).await.unwrap();
        let input = ReadingInput {
            humidity: 40.0,
            temperature: 20.0,
            light: Some(50.0),
            soil_moisture: None,
            timestamp: None,
        };
        f.sensors.publish("alice", "s1", input, t0()).await.unwrap();

        let snap = f.aggregator.snapshot("alice").await.unwrap();
        assert_eq!(snap.alerts.low_humidity.len(), 1);
        assert!(snap.cards[0].online);
    }
}
