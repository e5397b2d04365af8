//! Orchid care monitoring: plant registry, live sensor readings, per-owner
//! settings and the derived watering/environment alerts, served over HTTP.

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod evaluator;
pub mod monitor;
pub mod plants;
pub mod sensors;
pub mod settings;
pub mod store;
