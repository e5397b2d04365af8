use anyhow::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::watch;
use uuid::Uuid;

use super::{feed::ChangeFeed, DocumentStore};
use crate::{
    error::StoreError,
    plants::models::{Plant, WateringRecord},
};

const PLANT_COLUMNS: &str = "id, owner_id, name, species, location, watering_interval_days, \
     last_watered, next_watering, sensor_id, humidity, temperature, light, created_at";

/// Postgres-backed `DocumentStore`.
///
/// Change notifications are raised by this process after each committed
/// write; writes made by other processes are not observed.
#[derive(Debug)]
pub struct PgDocumentStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::new(),
        }
    }

    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn insert_plant(&self, plant: &Plant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO plants (id, owner_id, name, species, location, watering_interval_days,
                                last_watered, next_watering, sensor_id, humidity, temperature,
                                light, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(plant.id)
        .bind(&plant.owner_id)
        .bind(&plant.name)
        .bind(&plant.species)
        .bind(&plant.location)
        .bind(plant.watering_interval_days)
        .bind(plant.last_watered)
        .bind(plant.next_watering)
        .bind(&plant.sensor_id)
        .bind(plant.humidity)
        .bind(plant.temperature)
        .bind(plant.light)
        .bind(plant.created_at)
        .execute(&self.pool)
        .await?;

        self.feed.notify(&plant.owner_id);
        Ok(())
    }

    async fn get_plant(&self, id: Uuid) -> Result<Option<Plant>, StoreError> {
        let plant = sqlx::query_as::<_, Plant>(&format!(
            "SELECT {PLANT_COLUMNS} FROM plants WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plant)
    }

    async fn list_plants(&self, owner: &str) -> Result<Vec<Plant>, StoreError> {
        let plants = sqlx::query_as::<_, Plant>(&format!(
            "SELECT {PLANT_COLUMNS} FROM plants WHERE owner_id = $1 \
             ORDER BY created_at DESC, id ASC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(plants)
    }

    async fn replace_plant(&self, plant: &Plant) -> Result<bool, StoreError> {
        let previous_owner: Option<String> = sqlx::query_scalar(
            r#"
            WITH old AS (SELECT owner_id FROM plants WHERE id = $1)
            UPDATE plants
               SET owner_id = $2, name = $3, species = $4, location = $5,
                   watering_interval_days = $6, last_watered = $7, next_watering = $8,
                   sensor_id = $9, humidity = $10, temperature = $11, light = $12
             WHERE id = $1
            RETURNING (SELECT owner_id FROM old)
            "#,
        )
        .bind(plant.id)
        .bind(&plant.owner_id)
        .bind(&plant.name)
        .bind(&plant.species)
        .bind(&plant.location)
        .bind(plant.watering_interval_days)
        .bind(plant.last_watered)
        .bind(plant.next_watering)
        .bind(&plant.sensor_id)
        .bind(plant.humidity)
        .bind(plant.temperature)
        .bind(plant.light)
        .fetch_optional(&self.pool)
        .await?;

        let Some(previous_owner) = previous_owner else {
            return Ok(false);
        };
        self.feed.notify(&plant.owner_id);
        if previous_owner != plant.owner_id {
            self.feed.notify(&previous_owner);
        }
        Ok(true)
    }

    async fn delete_plant(&self, id: Uuid) -> Result<Option<Plant>, StoreError> {
        let removed = sqlx::query_as::<_, Plant>(&format!(
            "DELETE FROM plants WHERE id = $1 RETURNING {PLANT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(plant) = &removed {
            self.feed.notify(&plant.owner_id);
        }
        Ok(removed)
    }

    async fn record_watering(&self, plant: &Plant, record: &WateringRecord) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE plants
               SET last_watered = $2, next_watering = $3
             WHERE id = $1
            "#,
        )
        .bind(plant.id)
        .bind(plant.last_watered)
        .bind(plant.next_watering)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO watering_records (id, owner_id, plant_id, plant_name, watered_at, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(record.plant_id)
        .bind(&record.plant_name)
        .bind(record.watered_at)
        .bind(&record.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.feed.notify(&plant.owner_id);
        Ok(true)
    }

    async fn list_watering_records(
        &self,
        owner: &str,
        plant_id: Option<Uuid>,
    ) -> Result<Vec<WateringRecord>, StoreError> {
        let records = sqlx::query_as::<_, WateringRecord>(
            r#"
            SELECT id, owner_id, plant_id, plant_name, watered_at, notes
            FROM watering_records
            WHERE owner_id = $1
              AND ($2::uuid IS NULL OR plant_id = $2)
            ORDER BY watered_at DESC
            "#,
        )
        .bind(owner)
        .bind(plant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    fn plant_changes(&self, owner: &str) -> watch::Receiver<u64> {
        self.feed.subscribe(owner)
    }
}
