pub mod aggregator;
pub mod evaluate;

pub use aggregator::{DashboardAggregator, DashboardHandle};
pub use evaluate::{evaluate, AlertLists, AlertedPlant, Banner, DashboardSnapshot, PlantCard};
