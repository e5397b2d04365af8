use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use super::models::{AlertRecord, NewAlert};
use crate::{
    error::{ServiceError, ServiceResult, StoreError},
    store::{KeyPath, RealtimeStore, Subscription, WRITE_ATTEMPTS},
};

/// Append-only alert history per owner, with read flags.
#[derive(Clone)]
pub struct AlertLog {
    store: Arc<dyn RealtimeStore>,
}

impl AlertLog {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    pub async fn push(&self, owner: &str, alert: NewAlert, now: DateTime<Utc>) -> ServiceResult<AlertRecord> {
        let mut record = AlertRecord {
            id: String::new(),
            plant_id: alert.plant_id,
            plant_name: alert.plant_name,
            kind: alert.kind,
            message: alert.message,
            timestamp: now,
            read: false,
        };
        let path = KeyPath::alerts(owner);
        let value = serde_json::to_value(&record).map_err(|source| StoreError::Malformed {
            path: path.to_string(),
            source,
        })?;
        record.id = self.store.push(&path, value).await?;

        info!(
            owner = %owner,
            alert_id = %record.id,
            plant_id = %record.plant_id,
            kind = record.kind.as_str(),
            "Alert logged"
        );
        Ok(record)
    }

    /// Newest first.
    pub async fn list(&self, owner: &str) -> Result<Vec<AlertRecord>, StoreError> {
        let raw = self.store.get(&KeyPath::alerts(owner)).await?;
        Ok(records_from(raw.as_ref()))
    }

    pub async fn subscribe(&self, owner: &str) -> Subscription<Vec<AlertRecord>> {
        let rx = self.store.subscribe(&KeyPath::alerts(owner)).await;
        Subscription::map(rx, |raw: &Option<Value>| records_from(raw.as_ref()))
    }

    /// Sets the read flag. An alert deleted concurrently stays deleted and
    /// is reported as not found.
    pub async fn mark_read(&self, owner: &str, alert_id: &str) -> ServiceResult<AlertRecord> {
        let path = KeyPath::alert(owner, alert_id);
        for _ in 0..WRITE_ATTEMPTS {
            let current = self.store.get(&path).await?;
            let record = current
                .as_ref()
                .and_then(|v| AlertRecord::from_entry(alert_id, v))
                .ok_or_else(|| ServiceError::NotFound(format!("alert {alert_id}")))?;
            if record.read {
                return Ok(record);
            }

            let mut fields = current.as_ref().and_then(Value::as_object).cloned().unwrap_or_default();
            fields.insert("read".into(), Value::Bool(true));
            if self
                .store
                .compare_and_set(&path, current.as_ref(), Value::Object(fields))
                .await?
            {
                return Ok(AlertRecord { read: true, ..record });
            }
        }
        Err(ServiceError::Conflict(format!("alert {alert_id} is changing too fast")))
    }

    pub async fn delete(&self, owner: &str, alert_id: &str) -> ServiceResult<()> {
        self.get(owner, alert_id).await?;
        self.store.remove(&KeyPath::alert(owner, alert_id)).await?;
        info!(owner = %owner, alert_id = %alert_id, "Alert deleted");
        Ok(())
    }

    async fn get(&self, owner: &str, alert_id: &str) -> ServiceResult<AlertRecord> {
        self.store
            .get(&KeyPath::alert(owner, alert_id))
            .await?
            .and_then(|v| AlertRecord::from_entry(alert_id, &v))
            .ok_or_else(|| ServiceError::NotFound(format!("alert {alert_id}")))
    }
}

fn records_from(raw: Option<&Value>) -> Vec<AlertRecord> {
    let Some(entries) = raw.and_then(Value::as_object) else {
        return Vec::new();
    };
    // Keys are generated in write order, so reversing the key order yields
    // newest first even when timestamps tie.
    entries
        .iter()
        .rev()
        .filter_map(|(id, v)| AlertRecord::from_entry(id, v))
        .collect()
}
