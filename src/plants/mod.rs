pub mod models;
pub mod registry;

pub use registry::PlantRegistry;
