pub mod models;
pub mod service;

pub use models::{AlertKind, AlertRecord, NewAlert};
pub use service::AlertLog;
