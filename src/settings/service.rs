use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::models::{SettingToggle, Settings};
use crate::{
    error::StoreError,
    store::{KeyPath, RealtimeStore, Subscription},
};

/// Per-owner settings singleton over `settings/{owner}`.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn RealtimeStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    /// The stored record, or the default one if nothing is stored.
    pub async fn get_or_default(&self, owner: &str) -> Result<Settings, StoreError> {
        let raw = self.store.get(&KeyPath::settings(owner)).await?;
        Ok(settings_from(owner, raw.as_ref()))
    }

    /// Live settings; the default record stands in while none is stored.
    pub async fn subscribe(&self, owner: &str) -> Subscription<Settings> {
        let rx = self.store.subscribe(&KeyPath::settings(owner)).await;
        let owner = owner.to_owned();
        Subscription::map(rx, move |raw: &Option<Value>| settings_from(&owner, raw.as_ref()))
    }

    /// Writes a single toggle, leaving every other field untouched.
    pub async fn set_toggle(
        &self,
        owner: &str,
        toggle: SettingToggle,
        enabled: bool,
    ) -> Result<Settings, StoreError> {
        let mut fields = Map::new();
        fields.insert(toggle.field_name().to_owned(), Value::Bool(enabled));
        self.store.update(&KeyPath::settings(owner), fields).await?;

        info!(owner = %owner, toggle = toggle.field_name(), enabled, "Setting toggled");
        self.get_or_default(owner).await
    }

    /// Replaces the whole record.
    pub async fn save_all(&self, owner: &str, settings: &Settings) -> Result<(), StoreError> {
        let path = KeyPath::settings(owner);
        let value = serde_json::to_value(settings).map_err(|source| StoreError::Malformed {
            path: path.to_string(),
            source,
        })?;
        self.store.set(&path, value).await?;
        info!(owner = %owner, "Settings saved");
        Ok(())
    }

    /// Drops the stored record so the defaults apply again.
    pub async fn reset(&self, owner: &str) -> Result<Settings, StoreError> {
        self.store.remove(&KeyPath::settings(owner)).await?;
        info!(owner = %owner, "Settings reset");
        Ok(Settings::default())
    }
}

fn settings_from(owner: &str, raw: Option<&Value>) -> Settings {
    let Some(raw) = raw else {
        return Settings::default();
    };
    serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
        warn!(owner = %owner, error = %e, "Unreadable settings record; using defaults");
        Settings::default()
    })
}
