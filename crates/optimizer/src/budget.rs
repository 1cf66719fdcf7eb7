//! Budget allocation, scenario simulation, and diminishing-returns
//! analysis on top of fitted response curves.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::info;

use mmm_core::config::EngineConfig;
use mmm_core::stats::round2;
use mmm_core::store::HistoricalStore;
use mmm_core::types::Period;
use mmm_core::{MmmError, MmmResult};

use crate::curves::{CurveSet, ResponseCurve, ResponseCurveFitter};
use crate::solver;

/// Points sampled along each curve in diminishing-returns output.
const SPEND_GRID_POINTS: usize = 20;

/// Spend-to-saturation ratio bands for the efficiency verdict.
const UNDER_INVESTED_BELOW: f64 = 0.7;
const EFFICIENT_BELOW: f64 = 0.9;
const NEAR_SATURATION_BELOW: f64 = 1.1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One optimization run: where the budget should go and what that is
/// worth against the current baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub total_budget: f64,
    /// Optimal daily spend per channel, rounded to cents. Sums to the
    /// total budget whenever the bounds allow it.
    pub optimized_allocation: BTreeMap<String, f64>,
    pub projected_revenue: f64,
    /// Trailing daily revenue average the projection is compared to.
    pub current_revenue: f64,
    pub revenue_lift: f64,
    /// Lift as a percentage of the budget.
    pub roi_improvement: f64,
    pub recommendations: Vec<Recommendation>,
}

/// Actionable spend shift for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub channel: String,
    pub action: SpendAction,
    pub current_spend: f64,
    pub recommended_spend: f64,
    /// Absolute daily shift, in dollars.
    pub change_amount: f64,
    /// Signed shift relative to current spend, in percent. 0 when the
    /// channel currently spends nothing.
    pub change_percentage: f64,
    pub priority: Priority,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpendAction {
    Increase,
    Decrease,
}

/// Declaration order is the display order: high sorts before medium.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
}

/// Input to one what-if scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub total_budget: f64,
    /// Per-channel minimum-spend overrides for this scenario only.
    #[serde(default)]
    pub constraints: Option<BTreeMap<String, f64>>,
}

/// Outcome of one simulated scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario_name: String,
    pub total_budget: f64,
    pub projected_revenue: f64,
    pub revenue_lift: f64,
    /// Projected revenue per budget dollar.
    pub roi: f64,
    pub allocation: BTreeMap<String, f64>,
}

/// All scenario outcomes plus chart-ready series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub scenarios: Vec<ScenarioOutcome>,
    /// Scenario with the highest ROI; ties keep the earliest submitted.
    pub best_scenario: String,
    pub comparison_chart: ComparisonChart,
}

/// Parallel series for plotting scenarios side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonChart {
    pub labels: Vec<String>,
    pub budgets: Vec<f64>,
    pub revenues: Vec<f64>,
    pub roi_values: Vec<f64>,
}

/// Saturation diagnostics for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiminishingReturns {
    pub saturation_point: f64,
    pub current_spend: f64,
    pub efficiency_status: EfficiencyStatus,
    /// Marginal ROAS across consecutive spend steps up to saturation.
    pub marginal_returns_curve: Vec<MarginalPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarginalPoint {
    pub spend: f64,
    pub marginal_roas: f64,
}

/// Where current spend sits relative to the saturation point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EfficiencyStatus {
    UnderInvested,
    Efficient,
    NearSaturation,
    OverSaturated,
}

impl EfficiencyStatus {
    fn from_ratio(ratio: f64) -> Self {
        if ratio < UNDER_INVESTED_BELOW {
            EfficiencyStatus::UnderInvested
        } else if ratio < EFFICIENT_BELOW {
            EfficiencyStatus::Efficient
        } else if ratio < NEAR_SATURATION_BELOW {
            EfficiencyStatus::NearSaturation
        } else {
            EfficiencyStatus::OverSaturated
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Allocates daily budgets across channels using fitted response curves.
pub struct BudgetOptimizer<S> {
    store: Arc<S>,
    config: EngineConfig,
    fitter: ResponseCurveFitter<S>,
}

impl<S: HistoricalStore> BudgetOptimizer<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let fitter = ResponseCurveFitter::new(Arc::clone(&store), config.optimizer.clone());
        Self {
            store,
            config,
            fitter,
        }
    }

    /// Optimal split of `total_budget` across channels with usable
    /// history. `constraints` carries per-call minimum-spend overrides;
    /// channels not named fall back to their configured floors.
    pub fn optimize_budget(
        &self,
        total_budget: f64,
        constraints: Option<&BTreeMap<String, f64>>,
    ) -> MmmResult<OptimizationReport> {
        let today = Utc::now().date_naive();
        let curves = self.fitter.fit_window(today)?;
        self.run_optimization(total_budget, constraints, &curves, today)
    }

    /// Run each scenario against one shared curve fit and rank the
    /// outcomes by ROI.
    pub fn simulate_scenarios(&self, scenarios: &[Scenario]) -> MmmResult<ScenarioComparison> {
        if scenarios.is_empty() {
            return Err(MmmError::EmptyScenarios);
        }
        let today = Utc::now().date_naive();
        let curves = self.fitter.fit_window(today)?;

        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let report = self.run_optimization(
                scenario.total_budget,
                scenario.constraints.as_ref(),
                &curves,
                today,
            )?;
            outcomes.push(ScenarioOutcome {
                scenario_name: scenario.name.clone(),
                total_budget: scenario.total_budget,
                projected_revenue: report.projected_revenue,
                revenue_lift: report.revenue_lift,
                roi: round2(report.projected_revenue / scenario.total_budget),
                allocation: report.optimized_allocation,
            });
        }

        // Strictly-greater comparison: ties keep the earliest scenario.
        let mut best = &outcomes[0];
        for outcome in &outcomes[1..] {
            if outcome.roi > best.roi {
                best = outcome;
            }
        }
        let best_scenario = best.scenario_name.clone();
        let comparison_chart = ComparisonChart {
            labels: outcomes.iter().map(|o| o.scenario_name.clone()).collect(),
            budgets: outcomes.iter().map(|o| o.total_budget).collect(),
            revenues: outcomes.iter().map(|o| o.projected_revenue).collect(),
            roi_values: outcomes.iter().map(|o| o.roi).collect(),
        };
        Ok(ScenarioComparison {
            scenarios: outcomes,
            best_scenario,
            comparison_chart,
        })
    }

    /// Saturation diagnostics for every fitted curve.
    pub fn diminishing_returns_analysis(&self) -> MmmResult<BTreeMap<String, DiminishingReturns>> {
        let today = Utc::now().date_naive();
        let curves = self.fitter.fit_window(today)?;

        let mut analysis = BTreeMap::new();
        for (channel, curve) in curves.curves() {
            let levels = Array1::linspace(0.0, curve.saturation_point, SPEND_GRID_POINTS);
            let mut marginal_returns_curve = Vec::with_capacity(SPEND_GRID_POINTS - 1);
            for i in 1..levels.len() {
                let step = levels[i] - levels[i - 1];
                let marginal_roas = if step > 0.0 {
                    (curve.revenue_at(levels[i]) - curve.revenue_at(levels[i - 1])) / step
                } else {
                    0.0
                };
                marginal_returns_curve.push(MarginalPoint {
                    spend: round2(levels[i]),
                    marginal_roas: round2(marginal_roas),
                });
            }
            let ratio = if curve.saturation_point > 0.0 {
                curve.current_avg_spend / curve.saturation_point
            } else {
                0.0
            };
            analysis.insert(
                channel.to_string(),
                DiminishingReturns {
                    saturation_point: round2(curve.saturation_point),
                    current_spend: round2(curve.current_avg_spend),
                    efficiency_status: EfficiencyStatus::from_ratio(ratio),
                    marginal_returns_curve,
                },
            );
        }
        Ok(analysis)
    }

    fn run_optimization(
        &self,
        total_budget: f64,
        constraints: Option<&BTreeMap<String, f64>>,
        curves: &CurveSet,
        today: NaiveDate,
    ) -> MmmResult<OptimizationReport> {
        if !total_budget.is_finite() || total_budget <= 0.0 {
            return Err(MmmError::InvalidBudget(format!(
                "total budget must be positive, got {total_budget}"
            )));
        }

        let allocation = self.solve_allocation(total_budget, constraints, curves);
        let projected_revenue = curves.projected_revenue(&allocation);
        let current_revenue = self.current_daily_revenue(today)?;
        let revenue_lift = projected_revenue - current_revenue;
        let recommendations = self.recommendations(&allocation, today)?;

        info!(
            total_budget,
            channels = allocation.len(),
            projected = round2(projected_revenue),
            "budget optimized"
        );
        Ok(OptimizationReport {
            total_budget,
            optimized_allocation: allocation,
            projected_revenue: round2(projected_revenue),
            current_revenue: round2(current_revenue),
            revenue_lift: round2(revenue_lift),
            roi_improvement: round2(revenue_lift / total_budget * 100.0),
            recommendations,
        })
    }

    /// Solve the constrained allocation over fitted curves and round it
    /// to cents. Fallback channels carry no decision variable.
    fn solve_allocation(
        &self,
        total_budget: f64,
        constraints: Option<&BTreeMap<String, f64>>,
        curves: &CurveSet,
    ) -> BTreeMap<String, f64> {
        let fitted: Vec<(&str, &ResponseCurve)> = curves.curves().collect();
        if fitted.is_empty() {
            return BTreeMap::new();
        }
        let opt = &self.config.optimizer;

        let mut coefficients = Vec::with_capacity(fitted.len());
        let mut lo = Vec::with_capacity(fitted.len());
        let mut hi = Vec::with_capacity(fitted.len());
        let mut seed = Vec::with_capacity(fitted.len());
        for (channel, curve) in &fitted {
            let floor = constraints
                .and_then(|map| map.get(*channel))
                .copied()
                .unwrap_or_else(|| self.config.channels.spend_floor(channel));
            let cap = (total_budget * opt.max_channel_share).min(curve.saturation_point);
            // An infeasible floor/cap pair collapses to the cap.
            let floor = floor.max(0.0).min(cap);
            coefficients.push(curve.a);
            lo.push(floor);
            hi.push(cap);
            seed.push(curve.current_avg_spend);
        }

        let seed_total: f64 = seed.iter().sum();
        let seed: Vec<f64> = if seed_total > 0.0 {
            seed.iter()
                .map(|s| s * total_budget / seed_total)
                .collect()
        } else {
            vec![total_budget / fitted.len() as f64; fitted.len()]
        };

        let solution = solver::maximize_log_revenue(
            &coefficients,
            &lo,
            &hi,
            total_budget,
            &seed,
            opt.max_iterations,
        );

        let channels: Vec<&str> = fitted.iter().map(|(channel, _)| *channel).collect();
        rounded_allocation(&channels, &solution, &lo, &hi)
    }

    /// Average daily revenue over the trailing baseline window.
    fn current_daily_revenue(&self, today: NaiveDate) -> MmmResult<f64> {
        let days = self.config.optimizer.current_revenue_window_days;
        let window = Period::trailing(today, days);
        let revenue = self.store.revenue_in(window)?;
        Ok(revenue / days.max(1) as f64)
    }

    /// Spend-shift recommendations comparing the optimal allocation to
    /// recent actual spend.
    fn recommendations(
        &self,
        allocation: &BTreeMap<String, f64>,
        today: NaiveDate,
    ) -> MmmResult<Vec<Recommendation>> {
        let opt = &self.config.optimizer;
        let window = Period::trailing(today, opt.recommendation_window_days);
        let records = self.store.records_in(window)?;

        let mut spend_by_channel: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
        for record in &records {
            let entry = spend_by_channel.entry(record.channel.as_str()).or_default();
            entry.0 += record.spend;
            entry.1 += 1;
        }

        let mut recommendations = Vec::new();
        for (channel, &recommended) in allocation {
            let current = spend_by_channel
                .get(channel.as_str())
                .map(|(sum, days)| sum / *days as f64)
                .unwrap_or(0.0);
            let delta = recommended - current;
            if delta.abs() <= opt.min_recommendation_delta {
                continue;
            }
            let (action, verb) = if delta > 0.0 {
                (SpendAction::Increase, "Increase")
            } else {
                (SpendAction::Decrease, "Decrease")
            };
            let priority = if delta.abs() > opt.high_priority_delta {
                Priority::High
            } else {
                Priority::Medium
            };
            let change_percentage = if current > 0.0 {
                round2(delta / current * 100.0)
            } else {
                0.0
            };
            recommendations.push(Recommendation {
                channel: channel.clone(),
                action,
                current_spend: round2(current),
                recommended_spend: round2(recommended),
                change_amount: round2(delta.abs()),
                change_percentage,
                priority,
                message: format!("{verb} {channel} spend by ${:.0}/day", delta.abs()),
            });
        }
        recommendations.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.change_amount.total_cmp(&a.change_amount))
        });
        Ok(recommendations)
    }
}

/// Round a solved allocation to cents without losing the budget.
/// Rounding every line can drift the total by a few cents; the residual
/// is folded into the largest lines that still have headroom against
/// their bounds, so no line ever leaves its `[lo, hi]` interval.
fn rounded_allocation(
    channels: &[&str],
    solution: &[f64],
    lo: &[f64],
    hi: &[f64],
) -> BTreeMap<String, f64> {
    let mut allocation: BTreeMap<String, f64> = channels
        .iter()
        .zip(solution)
        .map(|(channel, spend)| (channel.to_string(), round2(*spend)))
        .collect();

    let rounded_total: f64 = allocation.values().sum();
    let mut residual = solution.iter().sum::<f64>() - rounded_total;
    if residual.abs() <= 1e-9 {
        return allocation;
    }

    let mut order: Vec<usize> = (0..channels.len()).collect();
    order.sort_by(|&i, &j| solution[j].total_cmp(&solution[i]));
    for i in order {
        if residual.abs() <= 1e-9 {
            break;
        }
        let current = allocation[channels[i]];
        let headroom = if residual > 0.0 {
            hi[i] - current
        } else {
            current - lo[i]
        };
        if headroom <= 0.0 {
            continue;
        }
        let shift = residual.clamp(-headroom, headroom);
        if let Some(value) = allocation.get_mut(channels[i]) {
            *value += shift;
            residual -= shift;
        }
    }
    allocation
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
