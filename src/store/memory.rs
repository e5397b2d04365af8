use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use super::{feed::ChangeFeed, DocumentStore};
use crate::{
    error::StoreError,
    plants::models::{Plant, WateringRecord},
};

/// In-process `DocumentStore`.
///
/// `set_offline(true)` makes every call fail with `StoreError::Unavailable`,
/// which is how callers exercise the "backend unreachable" path.
/// `set_records_failing(true)` fails only the watering-record half of
/// `record_watering`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    plants: RwLock<HashMap<Uuid, Plant>>,
    records: RwLock<Vec<WateringRecord>>,
    feed: ChangeFeed,
    offline: AtomicBool,
    records_failing: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_records_failing(&self, failing: bool) {
        self.records_failing.store(failing, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn insert_plant(&self, plant: &Plant) -> Result<(), StoreError> {
        self.check_online()?;
        self.plants.write().await.insert(plant.id, plant.clone());
        self.feed.notify(&plant.owner_id);
        Ok(())
    }

    async fn get_plant(&self, id: Uuid) -> Result<Option<Plant>, StoreError> {
        self.check_online()?;
        Ok(self.plants.read().await.get(&id).cloned())
    }

    async fn list_plants(&self, owner: &str) -> Result<Vec<Plant>, StoreError> {
        self.check_online()?;
        let mut plants: Vec<Plant> = self
            .plants
            .read()
            .await
            .values()
            .filter(|p| p.owner_id == owner)
            .cloned()
            .collect();
        plants.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(plants)
    }

    async fn replace_plant(&self, plant: &Plant) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut plants = self.plants.write().await;
        let Some(slot) = plants.get_mut(&plant.id) else {
            return Ok(false);
        };
        let previous_owner = std::mem::replace(slot, plant.clone()).owner_id;
        drop(plants);

        self.feed.notify(&plant.owner_id);
        if previous_owner != plant.owner_id {
            self.feed.notify(&previous_owner);
        }
        Ok(true)
    }

    async fn delete_plant(&self, id: Uuid) -> Result<Option<Plant>, StoreError> {
        self.check_online()?;
        let removed = self.plants.write().await.remove(&id);
        if let Some(plant) = &removed {
            self.feed.notify(&plant.owner_id);
        }
        Ok(removed)
    }

    async fn record_watering(&self, plant: &Plant, record: &WateringRecord) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut plants = self.plants.write().await;
        let mut records = self.records.write().await;
        let Some(slot) = plants.get_mut(&plant.id) else {
            return Ok(false);
        };
        if self.records_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "watering records are unavailable".to_owned(),
            ));
        }
        *slot = plant.clone();
        records.push(record.clone());
        drop(records);
        drop(plants);

        self.feed.notify(&plant.owner_id);
        Ok(true)
    }

    async fn list_watering_records(
        &self,
        owner: &str,
        plant_id: Option<Uuid>,
    ) -> Result<Vec<WateringRecord>, StoreError> {
        self.check_online()?;
        let mut records: Vec<WateringRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.owner_id == owner && plant_id.map_or(true, |id| r.plant_id == id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.watered_at.cmp(&a.watered_at));
        Ok(records)
    }

    fn plant_changes(&self, owner: &str) -> watch::Receiver<u64> {
        self.feed.subscribe(owner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn make_plant(owner: &str, name: &str, created_at: DateTime<Utc>) -> Plant {
        Plant {
            id: Uuid::new_v4(),
            owner_id: owner.to_owned(),
            name: name.to_owned(),
            species: "Phalaenopsis".to_owned(),
            location: String::new(),
            watering_interval_days: 7,
            last_watered: Some(created_at),
            next_watering: Some(created_at + Duration::days(7)),
            sensor_id: None,
            humidity: None,
            temperature: None,
            light: None,
            created_at,
        }
    }

    fn make_record(owner: &str, plant_id: Uuid, at: DateTime<Utc>) -> WateringRecord {
        WateringRecord {
            id: Uuid::new_v4(),
            owner_id: owner.to_owned(),
            plant_id,
            plant_name: "Rosa".to_owned(),
            watered_at: at,
            notes: None,
        }
    }

    #[tokio::test]
    async fn list_plants_is_scoped_and_newest_first() {
        let store = MemoryDocumentStore::new();
        store.insert_plant(&make_plant("alice", "old", t0())).await.unwrap();
        store
            .insert_plant(&make_plant("alice", "new", t0() + Duration::hours(1)))
            .await
            .unwrap();
        store.insert_plant(&make_plant("bob", "other", t0())).await.unwrap();

        let names: Vec<String> = store
            .list_plants("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn replace_missing_plant_returns_false() {
        let store = MemoryDocumentStore::new();
        let plant = make_plant("alice", "ghost", t0());
        assert!(!store.replace_plant(&plant).await.unwrap());
    }

    #[tokio::test]
    async fn delete_keeps_watering_records() {
        let store = MemoryDocumentStore::new();
        let plant = make_plant("alice", "rosa", t0());
        store.insert_plant(&plant).await.unwrap();
        assert!(store
            .record_watering(&plant, &make_record("alice", plant.id, t0()))
            .await
            .unwrap());

        let removed = store.delete_plant(plant.id).await.unwrap();
        assert_eq!(removed.map(|p| p.id), Some(plant.id));
        assert!(store.get_plant(plant.id).await.unwrap().is_none());
        assert_eq!(
            store.list_watering_records("alice", Some(plant.id)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn watering_records_filter_by_plant_newest_first() {
        let store = MemoryDocumentStore::new();
        let a = make_plant("alice", "a", t0());
        let b = make_plant("alice", "b", t0());
        let c = make_plant("bob", "c", t0());
        for plant in [&a, &b, &c] {
            store.insert_plant(plant).await.unwrap();
        }
        for (plant, at) in [(&a, t0()), (&a, t0() + Duration::days(7)), (&b, t0()), (&c, t0())] {
            let record = make_record(&plant.owner_id, plant.id, at);
            assert!(store.record_watering(plant, &record).await.unwrap());
        }

        let for_a = store.list_watering_records("alice", Some(a.id)).await.unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a[0].watered_at > for_a[1].watered_at);

        assert_eq!(store.list_watering_records("alice", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn record_watering_for_missing_plant_writes_nothing() {
        let store = MemoryDocumentStore::new();
        let ghost = make_plant("alice", "ghost", t0());
        let record = make_record("alice", ghost.id, t0());

        assert!(!store.record_watering(&ghost, &record).await.unwrap());
        assert!(store.list_watering_records("alice", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_record_write_keeps_the_plant() {
        let store = MemoryDocumentStore::new();
        let plant = make_plant("alice", "rosa", t0());
        store.insert_plant(&plant).await.unwrap();

        let mut watered = plant.clone();
        watered.last_watered = Some(t0() + Duration::days(3));
        watered.next_watering = Some(t0() + Duration::days(10));
        store.set_records_failing(true);
        let err = store
            .record_watering(&watered, &make_record("alice", plant.id, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        assert_eq!(store.get_plant(plant.id).await.unwrap(), Some(plant));
        assert!(store.list_watering_records("alice", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_bump_the_owner_feed() {
        let store = MemoryDocumentStore::new();
        let mut changes = store.plant_changes("alice");
        let plant = make_plant("alice", "rosa", t0());

        store.insert_plant(&plant).await.unwrap();
        changes.changed().await.unwrap();

        store.delete_plant(plant.id).await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), 2);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);
        let err = store.list_plants("alice").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_offline(false);
        assert!(store.list_plants("alice").await.unwrap().is_empty());
    }
}
