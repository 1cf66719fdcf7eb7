pub mod budget;
pub mod curves;
pub mod solver;

pub use budget::{BudgetOptimizer, OptimizationReport, Scenario, ScenarioComparison};
pub use curves::{ChannelModel, CurveSet, ResponseCurve, ResponseCurveFitter};
