pub mod engine;
pub mod models;

pub use engine::{AttributionEngine, AttributionReport, ModelComparison};
pub use models::AttributionStrategy;
