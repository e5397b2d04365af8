use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{NewPlant, Plant, PlantPatch, WateringRecord};
use crate::{
    error::{ServiceError, ServiceResult},
    evaluator,
    store::{DocumentStore, Subscription},
};

/// Owner-scoped plant CRUD on top of a `DocumentStore`.
///
/// A plant belonging to another owner is reported as not found.
#[derive(Clone)]
pub struct PlantRegistry {
    store: Arc<dyn DocumentStore>,
}

impl PlantRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Which document store backs this registry.
    pub fn backend(&self) -> &'static str {
        self.store.backend_tag()
    }

    /// Creates a plant watered "now", next due one interval later.
    pub async fn create(&self, owner: &str, new: NewPlant, now: DateTime<Utc>) -> ServiceResult<Plant> {
        let name = required_text("name", &new.name)?;
        let species = required_text("species", &new.species)?;
        validate_interval(new.watering_interval_days)?;

        let mut plant = Plant {
            id: Uuid::new_v4(),
            owner_id: owner.to_owned(),
            name,
            species,
            location: new.location.trim().to_owned(),
            watering_interval_days: new.watering_interval_days,
            last_watered: None,
            next_watering: None,
            sensor_id: normalize_sensor_id(new.sensor_id.as_deref()),
            humidity: new.humidity,
            temperature: new.temperature,
            light: new.light,
            created_at: now,
        };
        schedule(&mut plant, now)?;

        self.store.insert_plant(&plant).await?;
        info!(owner = %owner, plant_id = %plant.id, name = %plant.name, "Plant created");
        Ok(plant)
    }

    pub async fn get(&self, owner: &str, id: Uuid) -> ServiceResult<Plant> {
        match self.store.get_plant(id).await? {
            Some(plant) if plant.owner_id == owner => Ok(plant),
            _ => Err(ServiceError::NotFound(format!("plant {id}"))),
        }
    }

    pub async fn list(&self, owner: &str) -> ServiceResult<Vec<Plant>> {
        Ok(self.store.list_plants(owner).await?)
    }

    /// Live list of `owner`'s plants, newest first.
    ///
    /// A failed refresh keeps the previous list and is logged.
    pub async fn subscribe(&self, owner: &str) -> ServiceResult<Subscription<Vec<Plant>>> {
        // Subscribe before the first read so no write slips between the two.
        let mut changes = self.store.plant_changes(owner);
        let initial = self.store.list_plants(owner).await?;
        let (tx, rx) = watch::channel(initial);

        let store = self.store.clone();
        let owner = owner.to_owned();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        match store.list_plants(&owner).await {
                            Ok(plants) => {
                                if tx.send(plants).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(owner = %owner, error = %e, "Plant refresh failed; keeping last list");
                            }
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });
        Ok(Subscription::with_task(rx, task))
    }

    pub async fn update(&self, owner: &str, id: Uuid, patch: PlantPatch) -> ServiceResult<Plant> {
        let mut plant = self.get(owner, id).await?;

        if let Some(name) = patch.name {
            plant.name = required_text("name", &name)?;
        }
        if let Some(species) = patch.species {
            plant.species = required_text("species", &species)?;
        }
        if let Some(location) = patch.location {
            plant.location = location.trim().to_owned();
        }
        if let Some(days) = patch.watering_interval_days {
            validate_interval(days)?;
            plant.watering_interval_days = days;
        }
        if let Some(sensor_id) = patch.sensor_id {
            plant.sensor_id = normalize_sensor_id(Some(&sensor_id));
        }
        if patch.humidity.is_some() {
            plant.humidity = patch.humidity;
        }
        if patch.temperature.is_some() {
            plant.temperature = patch.temperature;
        }
        if patch.light.is_some() {
            plant.light = patch.light;
        }

        self.replace(plant).await
    }

    pub async fn link_sensor(&self, owner: &str, id: Uuid, sensor_id: &str) -> ServiceResult<Plant> {
        let sensor_id = normalize_sensor_id(Some(sensor_id))
            .ok_or_else(|| ServiceError::Validation("sensor id must not be empty".into()))?;
        let mut plant = self.get(owner, id).await?;
        plant.sensor_id = Some(sensor_id);
        self.replace(plant).await
    }

    pub async fn unlink_sensor(&self, owner: &str, id: Uuid) -> ServiceResult<Plant> {
        let mut plant = self.get(owner, id).await?;
        plant.sensor_id = None;
        self.replace(plant).await
    }

    /// Records a watering at `at`: moves the due date one interval past `at`
    /// and appends a watering record. Both land or neither does.
    pub async fn mark_watered(
        &self,
        owner: &str,
        id: Uuid,
        at: DateTime<Utc>,
        notes: Option<String>,
    ) -> ServiceResult<(Plant, WateringRecord)> {
        let mut plant = self.get(owner, id).await?;
        schedule(&mut plant, at)?;

        let record = WateringRecord {
            id: Uuid::new_v4(),
            owner_id: owner.to_owned(),
            plant_id: plant.id,
            plant_name: plant.name.clone(),
            watered_at: at,
            notes: notes.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()),
        };
        if !self.store.record_watering(&plant, &record).await? {
            return Err(ServiceError::NotFound(format!("plant {id}")));
        }

        info!(
            owner = %owner,
            plant_id = %plant.id,
            next_watering = ?plant.next_watering,
            "Plant watered"
        );
        Ok((plant, record))
    }

    /// Deletes the plant record only; its watering records and sensor
    /// history stay where they are.
    pub async fn delete(&self, owner: &str, id: Uuid) -> ServiceResult<Plant> {
        self.get(owner, id).await?;
        let removed = self
            .store
            .delete_plant(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("plant {id}")))?;
        info!(owner = %owner, plant_id = %id, "Plant deleted");
        Ok(removed)
    }

    pub async fn watering_records(
        &self,
        owner: &str,
        plant_id: Option<Uuid>,
    ) -> ServiceResult<Vec<WateringRecord>> {
        Ok(self.store.list_watering_records(owner, plant_id).await?)
    }

    async fn replace(&self, plant: Plant) -> ServiceResult<Plant> {
        if !self.store.replace_plant(&plant).await? {
            return Err(ServiceError::NotFound(format!("plant {}", plant.id)));
        }
        Ok(plant)
    }
}

fn required_text(field: &str, value: &str) -> ServiceResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(value.to_owned())
}

fn validate_interval(days: i32) -> ServiceResult<()> {
    if !(1..=evaluator::MAX_INTERVAL_DAYS).contains(&days) {
        return Err(ServiceError::Validation(format!(
            "watering interval must be between 1 and {} days",
            evaluator::MAX_INTERVAL_DAYS
        )));
    }
    Ok(())
}

fn schedule(plant: &mut Plant, watered_at: DateTime<Utc>) -> ServiceResult<()> {
    if !evaluator::mark_watered(plant, watered_at) {
        return Err(ServiceError::Validation(format!(
            "no watering date can follow {watered_at}"
        )));
    }
    Ok(())
}

/// Blank means "no sensor".
fn normalize_sensor_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::MemoryDocumentStore;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn new_plant(name: &str, days: i32) -> NewPlant {
        NewPlant {
            name: name.to_owned(),
            species: "Phalaenopsis".to_owned(),
            location: " living room ".to_owned(),
            watering_interval_days: days,
            sensor_id: None,
            humidity: Some(65.0),
            temperature: Some(22.0),
            light: Some(75.0),
        }
    }

    fn registry() -> (Arc<MemoryDocumentStore>, PlantRegistry) {
        let store = Arc::new(MemoryDocumentStore::new());
        (store.clone(), PlantRegistry::new(store))
    }

    #[tokio::test]
    async fn create_schedules_first_watering() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        assert_eq!(plant.owner_id, "alice");
        assert_eq!(plant.location, "living room");
        assert_eq!(plant.last_watered, Some(t0()));
        assert_eq!(plant.next_watering, Some(t0() + Duration::days(7)));
        assert_eq!(plants.get("alice", plant.id).await.unwrap(), plant);
    }

    #[tokio::test]
    async fn create_validates_required_fields() {
        let (_, plants) = registry();
        for bad in [
            NewPlant { name: " ".into(), ..new_plant("x", 7) },
            NewPlant { species: String::new(), ..new_plant("x", 7) },
            new_plant("x", 0),
            new_plant("x", -3),
            new_plant("x", evaluator::MAX_INTERVAL_DAYS + 1),
            new_plant("x", i32::MAX),
        ] {
            let err = plants.create("alice", bad, t0()).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
        assert!(plants.list("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_owners_plants_are_invisible() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        assert!(matches!(
            plants.get("bob", plant.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            plants.delete("bob", plant.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(plants.list("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        let patch = PlantPatch {
            name: Some("Blanca".into()),
            watering_interval_days: Some(10),
            ..Default::default()
        };
        let updated = plants.update("alice", plant.id, patch).await.unwrap();
        assert_eq!(updated.name, "Blanca");
        assert_eq!(updated.species, plant.species);
        assert_eq!(updated.watering_interval_days, 10);
        // The due date only moves when the plant is watered.
        assert_eq!(updated.next_watering, plant.next_watering);

        let bad = PlantPatch {
            watering_interval_days: Some(0),
            ..Default::default()
        };
        assert!(plants.update("alice", plant.id, bad).await.is_err());
    }

    #[tokio::test]
    async fn link_and_unlink_sensor() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        let linked = plants.link_sensor("alice", plant.id, "s1").await.unwrap();
        assert_eq!(linked.sensor_id.as_deref(), Some("s1"));

        let unlinked = plants.unlink_sensor("alice", plant.id).await.unwrap();
        assert!(unlinked.sensor_id.is_none());

        let relinked = plants
            .update(
                "alice",
                plant.id,
                PlantPatch {
                    sensor_id: Some("s2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(relinked.sensor_id.as_deref(), Some("s2"));

        let cleared = plants
            .update(
                "alice",
                plant.id,
                PlantPatch {
                    sensor_id: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.sensor_id.is_none());

        assert!(plants.link_sensor("alice", plant.id, "  ").await.is_err());
    }

    #[tokio::test]
    async fn mark_watered_moves_due_date_and_records_event() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        let at = t0() + Duration::days(9);
        let (watered, record) = plants
            .mark_watered("alice", plant.id, at, Some(" fertilized ".into()))
            .await
            .unwrap();
        assert_eq!(watered.last_watered, Some(at));
        assert_eq!(watered.next_watering, Some(at + Duration::days(7)));
        assert_eq!(record.plant_id, plant.id);
        assert_eq!(record.notes.as_deref(), Some("fertilized"));

        let records = plants.watering_records("alice", Some(plant.id)).await.unwrap();
        assert_eq!(records, vec![record]);
    }

    #[tokio::test]
    async fn far_future_watering_is_rejected_without_writing() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        let err = plants
            .mark_watered("alice", plant.id, DateTime::<Utc>::MAX_UTC, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(plants.get("alice", plant.id).await.unwrap(), plant);
        assert!(plants.watering_records("alice", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_record_write_leaves_schedule_alone() {
        let (store, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();

        store.set_records_failing(true);
        let err = plants
            .mark_watered("alice", plant.id, t0() + Duration::days(3), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
        assert_eq!(plants.get("alice", plant.id).await.unwrap(), plant);

        // A retry after recovery moves the date exactly once.
        store.set_records_failing(false);
        let (watered, _) = plants
            .mark_watered("alice", plant.id, t0() + Duration::days(3), None)
            .await
            .unwrap();
        assert_eq!(watered.next_watering, Some(t0() + Duration::days(10)));
        assert_eq!(plants.watering_records("alice", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_leaves_records_behind() {
        let (_, plants) = registry();
        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();
        plants.mark_watered("alice", plant.id, t0(), None).await.unwrap();

        plants.delete("alice", plant.id).await.unwrap();
        assert!(plants.list("alice").await.unwrap().is_empty());
        assert_eq!(plants.watering_records("alice", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscription_follows_writes() {
        let (_, plants) = registry();
        let mut sub = plants.subscribe("alice").await.unwrap();
        assert!(sub.current().is_empty());

        let plant = plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();
        let listed = sub.changed().await.unwrap();
        assert_eq!(listed, vec![plant.clone()]);

        plants.delete("alice", plant.id).await.unwrap();
        assert!(sub.changed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_keeps_last_list_when_store_fails() {
        let (store, plants) = registry();
        plants.create("alice", new_plant("Rosa", 7), t0()).await.unwrap();
        let sub = plants.subscribe("alice").await.unwrap();

        store.set_offline(true);
        assert_eq!(sub.current().len(), 1);
        store.set_offline(false);
    }
}
