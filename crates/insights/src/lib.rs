pub mod engine;

pub use engine::{ChannelPerformanceReport, InsightsEngine, OverviewReport, TrendsReport};
