use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::models::parse_timestamp;
use crate::{
    error::{ServiceError, ServiceResult, StoreError},
    store::{KeyPath, RealtimeStore, WRITE_ATTEMPTS},
};

/// A device waiting in `unclaimed_sensors/{device_id}` to be assigned to an
/// owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UnclaimedDevice {
    pub device_id: String,
    pub announced_at: Option<DateTime<Utc>>,
    /// Owner the device should start reporting under, once claimed.
    pub target_owner: Option<String>,
}

impl UnclaimedDevice {
    fn from_value(device_id: &str, value: &Value) -> Option<Self> {
        let record = value.as_object()?;
        Some(Self {
            device_id: device_id.to_owned(),
            announced_at: parse_timestamp(record.get("announcedAt")),
            target_owner: record
                .get("targetOwner")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
        })
    }
}

/// The device-claim handshake: devices announce themselves, an owner claims
/// one by writing its id into the device's `targetOwner` field.
#[derive(Clone)]
pub struct ClaimDesk {
    store: Arc<dyn RealtimeStore>,
}

impl ClaimDesk {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<UnclaimedDevice>, StoreError> {
        let raw = self.store.get(&KeyPath::unclaimed_sensors()).await?;
        let Some(devices) = raw.as_ref().and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        Ok(devices
            .iter()
            .filter_map(|(id, v)| UnclaimedDevice::from_value(id, v))
            .collect())
    }

    /// Device side: registers (or refreshes) `device_id` as waiting to be
    /// claimed. An existing `targetOwner` is kept.
    pub async fn announce(&self, device_id: &str, now: DateTime<Utc>) -> ServiceResult<UnclaimedDevice> {
        validate_id("device id", device_id)?;
        let path = KeyPath::unclaimed_sensor(device_id);

        let mut fields = Map::new();
        fields.insert("announcedAt".into(), Value::from(now.timestamp_millis()));
        self.store.update(&path, fields).await?;

        let device = self.get(device_id).await?;
        info!(device_id = %device_id, "Device announced");
        Ok(device)
    }

    /// Owner side: assigns `device_id` to `owner`.
    ///
    /// Claiming again for the same owner is a no-op; a device already
    /// targeted at a different owner is a conflict. Of two owners claiming
    /// at once exactly one wins and the other sees the conflict.
    pub async fn claim(&self, device_id: &str, owner: &str) -> ServiceResult<UnclaimedDevice> {
        validate_id("device id", device_id)?;
        validate_id("owner", owner)?;
        let path = KeyPath::unclaimed_sensor(device_id);

        for _ in 0..WRITE_ATTEMPTS {
            let current = self.store.get(&path).await?;
            let device = current
                .as_ref()
                .and_then(|v| UnclaimedDevice::from_value(device_id, v))
                .ok_or_else(|| ServiceError::NotFound(format!("device {device_id}")))?;
            match device.target_owner.as_deref() {
                Some(existing) if existing == owner => return Ok(device),
                Some(existing) => {
                    warn!(device_id = %device_id, owner = %owner, current = %existing, "Claim refused");
                    return Err(ServiceError::Conflict(format!(
                        "device {device_id} is already claimed"
                    )));
                }
                None => {}
            }

            let mut claimed = current.as_ref().and_then(Value::as_object).cloned().unwrap_or_default();
            claimed.insert("targetOwner".into(), Value::from(owner));
            if self
                .store
                .compare_and_set(&path, current.as_ref(), Value::Object(claimed))
                .await?
            {
                info!(device_id = %device_id, owner = %owner, "Device claimed");
                return Ok(UnclaimedDevice {
                    target_owner: Some(owner.to_owned()),
                    ..device
                });
            }
            debug!(device_id = %device_id, "Device record changed during claim; retrying");
        }

        Err(ServiceError::Conflict(format!(
            "device {device_id} is changing too fast to claim"
        )))
    }

    async fn get(&self, device_id: &str) -> ServiceResult<UnclaimedDevice> {
        self.store
            .get(&KeyPath::unclaimed_sensor(device_id))
            .await?
            .and_then(|v| UnclaimedDevice::from_value(device_id, &v))
            .ok_or_else(|| ServiceError::NotFound(format!("device {device_id}")))
    }
}

fn validate_id(what: &str, id: &str) -> ServiceResult<()> {
    if id.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}
