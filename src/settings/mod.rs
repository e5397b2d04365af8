pub mod models;
pub mod service;

pub use models::{SettingToggle, Settings};
pub use service::SettingsStore;
