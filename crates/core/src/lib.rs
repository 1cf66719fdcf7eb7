pub mod aggregate;
pub mod config;
pub mod error;
pub mod stats;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use error::{MmmError, MmmResult};
