//! Collaborator contracts: a document store for plants and watering records,
//! and a realtime keyed store for sensor state, settings, alerts and device
//! claims.

pub mod feed;
pub mod memory;
pub mod postgres;
pub mod realtime;
pub mod subscription;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    error::StoreError,
    plants::models::{Plant, WateringRecord},
};

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;
pub use realtime::MemoryRealtimeStore;
pub use subscription::Subscription;

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// CRUD over the `plants` and `watering_records` collections.
///
/// Every record carries its owner; listings are scoped to one owner and
/// ordered newest first. `plant_changes` bumps once per committed write that
/// touches the owner's plants.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn insert_plant(&self, plant: &Plant) -> Result<(), StoreError>;

    async fn get_plant(&self, id: Uuid) -> Result<Option<Plant>, StoreError>;

    /// Plants of `owner`, `created_at` descending.
    async fn list_plants(&self, owner: &str) -> Result<Vec<Plant>, StoreError>;

    /// Overwrites the stored plant with the same id. Returns `false` if no
    /// such plant exists.
    async fn replace_plant(&self, plant: &Plant) -> Result<bool, StoreError>;

    /// Removes the plant and returns it. Watering records are left in place.
    async fn delete_plant(&self, id: Uuid) -> Result<Option<Plant>, StoreError>;

    /// Stores the watered `plant` and appends `record` as one unit: either
    /// both writes land or neither does. Returns `false` if no such plant
    /// exists.
    async fn record_watering(&self, plant: &Plant, record: &WateringRecord) -> Result<bool, StoreError>;

    /// Records of `owner`, optionally for one plant, `watered_at` descending.
    async fn list_watering_records(
        &self,
        owner: &str,
        plant_id: Option<Uuid>,
    ) -> Result<Vec<WateringRecord>, StoreError>;

    /// Revision counter for `owner`'s plants.
    fn plant_changes(&self, owner: &str) -> watch::Receiver<u64>;
}

// ---------------------------------------------------------------------------
// Realtime keyed store
// ---------------------------------------------------------------------------

/// Read-modify-write loops give up after this many lost races.
pub const WRITE_ATTEMPTS: usize = 5;

/// A slash-separated location in the realtime keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// `true` if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &KeyPath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// `sensors/{owner}`
    pub fn sensors(owner: &str) -> Self {
        Self::root().child("sensors").child(owner)
    }

    /// `sensors/{owner}/{sensor_id}`
    pub fn sensor(owner: &str, sensor_id: &str) -> Self {
        Self::sensors(owner).child(sensor_id)
    }

    /// `history/{owner}/{sensor_id}`
    pub fn history(owner: &str, sensor_id: &str) -> Self {
        Self::root().child("history").child(owner).child(sensor_id)
    }

    /// `settings/{owner}`
    pub fn settings(owner: &str) -> Self {
        Self::root().child("settings").child(owner)
    }

    /// `alerts/{owner}`
    pub fn alerts(owner: &str) -> Self {
        Self::root().child("alerts").child(owner)
    }

    /// `alerts/{owner}/{alert_id}`
    pub fn alert(owner: &str, alert_id: &str) -> Self {
        Self::alerts(owner).child(alert_id)
    }

    /// `unclaimed_sensors`
    pub fn unclaimed_sensors() -> Self {
        Self::root().child("unclaimed_sensors")
    }

    /// `unclaimed_sensors/{device_id}`
    pub fn unclaimed_sensor(device_id: &str) -> Self {
        Self::unclaimed_sensors().child(device_id)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Read/write/subscribe over a JSON tree.
///
/// Writing `null` (or an empty object) removes the key, and parents left
/// empty disappear with it. Subscriptions see the current value at their
/// path immediately and then every change at or below it; there is no
/// ordering guarantee across distinct keys.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn get(&self, path: &KeyPath) -> Result<Option<Value>, StoreError>;

    /// Replaces the value at `path` (last write wins).
    async fn set(&self, path: &KeyPath, value: Value) -> Result<(), StoreError>;

    /// Shallow merge of `fields` into the object at `path`.
    async fn update(&self, path: &KeyPath, fields: Map<String, Value>) -> Result<(), StoreError>;

    async fn remove(&self, path: &KeyPath) -> Result<(), StoreError>;

    /// Writes `value` at `path` only if the current value there equals
    /// `expected` (`None` meaning absent). Returns whether it wrote.
    async fn compare_and_set(
        &self,
        path: &KeyPath,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool, StoreError>;

    /// The last `limit` children of `path` in key order.
    async fn last_children(
        &self,
        path: &KeyPath,
        limit: usize,
    ) -> Result<Vec<(String, Value)>, StoreError>;

    async fn subscribe(&self, path: &KeyPath) -> watch::Receiver<Option<Value>>;

    /// A fresh child key. Keys generated later sort after keys generated
    /// earlier.
    fn generate_key(&self) -> String;

    /// Appends `value` under a generated key and returns the key.
    async fn push(&self, path: &KeyPath, value: Value) -> Result<String, StoreError> {
        let key = self.generate_key();
        self.set(&path.child(key.clone()), value).await?;
        Ok(key)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_paths_render_with_slashes() {
        assert_eq!(KeyPath::sensor("u1", "s1").to_string(), "sensors/u1/s1");
        assert_eq!(KeyPath::history("u1", "s1").to_string(), "history/u1/s1");
        assert_eq!(KeyPath::settings("u1").to_string(), "settings/u1");
        assert_eq!(KeyPath::alert("u1", "a1").to_string(), "alerts/u1/a1");
        assert_eq!(
            KeyPath::unclaimed_sensor("dev").to_string(),
            "unclaimed_sensors/dev"
        );
        assert_eq!(KeyPath::root().to_string(), "");
    }

    #[test]
    fn prefix_relation() {
        let owner = KeyPath::sensors("u1");
        let sensor = KeyPath::sensor("u1", "s1");
        assert!(owner.is_prefix_of(&sensor));
        assert!(sensor.is_prefix_of(&sensor));
        assert!(!sensor.is_prefix_of(&owner));
        assert!(!KeyPath::sensors("u2").is_prefix_of(&sensor));
        assert!(KeyPath::root().is_prefix_of(&sensor));
    }
}
