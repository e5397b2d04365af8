pub mod service;

pub use service::AlertMonitor;
