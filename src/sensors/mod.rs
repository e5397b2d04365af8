pub mod claim;
pub mod models;
pub mod service;

pub use claim::ClaimDesk;
pub use service::SensorStreamAdapter;
