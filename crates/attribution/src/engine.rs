//! Attribution pipeline: validate, aggregate, apply a model, normalize,
//! persist, summarize. Also runs the five-model comparison.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use mmm_core::aggregate;
use mmm_core::config::EngineConfig;
use mmm_core::error::MmmResult;
use mmm_core::stats::{mean, round2, variance};
use mmm_core::store::HistoricalStore;
use mmm_core::types::{
    AttributionModel, AttributionResult, ChannelTotals, Period, StoredAttribution,
};

use crate::models::{strategy_for, AttributionStrategy, CreditBasis};

/// Mean-variance threshold below which the models agree closely enough
/// that the simplest model wins.
const LOW_VARIANCE: f64 = 5.0;
/// Mean-variance threshold below which a position-based blend is the
/// reasonable middle ground.
const MODERATE_VARIANCE: f64 = 15.0;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Attribution output for one model over one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionReport {
    pub model: AttributionModel,
    pub period: Period,
    pub results: Vec<AttributionResult>,
    pub summary: AttributionSummary,
}

/// Headline numbers for a result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionSummary {
    pub total_attributed_conversions: u64,
    pub total_attributed_revenue: f64,
    pub top_performer: Option<Performer>,
    pub bottom_performer: Option<Performer>,
}

/// A channel singled out by the summary, with its headline figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performer {
    pub channel: String,
    pub revenue: f64,
    pub percentage: f64,
}

/// Spread of one channel's percentage across the five models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpread {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

/// Output of the five-model comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelComparison {
    pub period: Period,
    pub models: BTreeMap<AttributionModel, Vec<AttributionResult>>,
    pub channel_variance: BTreeMap<String, ChannelSpread>,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// AttributionEngine
// ---------------------------------------------------------------------------

/// Applies credit-splitting models to windowed channel history and
/// persists each computed result set.
pub struct AttributionEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: HistoricalStore> AttributionEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// String-typed entry point for API callers: parses `%Y-%m-%d` dates
    /// and a snake_case model id, then runs the pipeline. Malformed
    /// inputs come back as structured errors, never panics.
    pub fn calculate_attribution(
        &self,
        start: &str,
        end: &str,
        model: &str,
    ) -> MmmResult<AttributionReport> {
        let period = Period::parse(start, end)?;
        let model: AttributionModel = model.parse()?;
        self.attribute(period, model)
    }

    /// Run one model over one period and persist the result set.
    pub fn attribute(
        &self,
        period: Period,
        model: AttributionModel,
    ) -> MmmResult<AttributionReport> {
        let records = self.store.records_in(period)?;
        let totals = aggregate::by_channel_in(&records, period);

        let results = if totals.is_empty() {
            // No rows in the window: emit the configured roster with
            // all-zero values so consumers always see a stable shape.
            self.zero_roster()
        } else {
            let channels: Vec<(String, ChannelTotals)> = totals.into_iter().collect();
            let strategy = strategy_for(model, &self.config.channels);
            apply(strategy.as_ref(), &channels)
        };

        self.persist(model, period.end, &results)?;
        let summary = summarize(&results);

        info!(
            model = %model,
            start = %period.start,
            end = %period.end,
            channels = results.len(),
            "attribution computed"
        );

        Ok(AttributionReport {
            model,
            period,
            results,
            summary,
        })
    }

    /// String-typed entry point for the five-model comparison.
    pub fn compare_attribution_models(
        &self,
        start: &str,
        end: &str,
    ) -> MmmResult<ModelComparison> {
        let period = Period::parse(start, end)?;
        self.compare(period)
    }

    /// Run all five models over the same period, measure how much their
    /// percentage splits disagree per channel, and recommend a model.
    /// Each model's stored result set is refreshed as a side effect.
    pub fn compare(&self, period: Period) -> MmmResult<ModelComparison> {
        let mut models = BTreeMap::new();
        for model in AttributionModel::ALL {
            let report = self.attribute(period, model)?;
            models.insert(model, report.results);
        }

        let channels: BTreeSet<String> = models
            .values()
            .flat_map(|results| results.iter().map(|r| r.channel.clone()))
            .collect();

        let mut channel_variance = BTreeMap::new();
        for channel in channels {
            let percentages: Vec<f64> = models
                .values()
                .map(|results| {
                    results
                        .iter()
                        .find(|r| r.channel == channel)
                        .map(|r| r.percentage)
                        .unwrap_or(0.0)
                })
                .collect();

            channel_variance.insert(
                channel,
                ChannelSpread {
                    min: percentages.iter().copied().fold(f64::INFINITY, f64::min),
                    max: percentages.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean: round2(mean(&percentages)),
                    variance: round2(variance(&percentages)),
                },
            );
        }

        let recommendation = recommend(&channel_variance);
        Ok(ModelComparison {
            period,
            models,
            channel_variance,
            recommendation,
        })
    }

    fn zero_roster(&self) -> Vec<AttributionResult> {
        self.config
            .channels
            .default_channels
            .iter()
            .map(|name| AttributionResult {
                channel: name.clone(),
                attributed_conversions: 0,
                attributed_revenue: 0.0,
                percentage: 0.0,
            })
            .collect()
    }

    fn persist(
        &self,
        model: AttributionModel,
        end: NaiveDate,
        results: &[AttributionResult],
    ) -> MmmResult<()> {
        let now = Utc::now();
        let rows = results
            .iter()
            .map(|r| StoredAttribution {
                id: Uuid::new_v4(),
                date: end,
                channel: r.channel.clone(),
                model,
                attributed_conversions: r.attributed_conversions,
                attributed_revenue: r.attributed_revenue,
                created_at: now,
            })
            .collect();
        self.store.replace_attribution(model, end, rows)
    }
}

// ---------------------------------------------------------------------------
// Normalization and summary
// ---------------------------------------------------------------------------

/// Apply a strategy's weights and normalize into the shared result
/// shape. Each share is its weight over the weight sum, coerced to 0
/// when the weights sum to 0, so output never contains NaN or infinity.
fn apply(
    strategy: &dyn AttributionStrategy,
    channels: &[(String, ChannelTotals)],
) -> Vec<AttributionResult> {
    let weights = strategy.weigh(channels);
    debug_assert_eq!(weights.len(), channels.len());

    let weight_sum: f64 = weights.iter().sum();
    let total_conversions: f64 = channels.iter().map(|(_, t)| t.conversions).sum();
    let total_revenue: f64 = channels.iter().map(|(_, t)| t.revenue).sum();

    channels
        .iter()
        .zip(weights)
        .map(|((name, totals), weight)| {
            let share = if weight_sum > 0.0 { weight / weight_sum } else { 0.0 };
            let (conversions, revenue) = match strategy.basis() {
                CreditBasis::OwnTotals => (totals.conversions, totals.revenue),
                CreditBasis::SharedTotals => {
                    (total_conversions * share, total_revenue * share)
                }
            };
            AttributionResult {
                channel: name.clone(),
                attributed_conversions: conversions as u64,
                attributed_revenue: round2(revenue),
                percentage: round2(share * 100.0),
            }
        })
        .collect()
}

fn summarize(results: &[AttributionResult]) -> AttributionSummary {
    let total_conversions: u64 = results.iter().map(|r| r.attributed_conversions).sum();
    let total_revenue: f64 = results.iter().map(|r| r.attributed_revenue).sum();

    let mut by_revenue: Vec<&AttributionResult> = results.iter().collect();
    by_revenue.sort_by(|a, b| b.attributed_revenue.total_cmp(&a.attributed_revenue));

    let performer = |r: &&AttributionResult| Performer {
        channel: r.channel.clone(),
        revenue: round2(r.attributed_revenue),
        percentage: r.percentage,
    };

    AttributionSummary {
        total_attributed_conversions: total_conversions,
        total_attributed_revenue: round2(total_revenue),
        top_performer: by_revenue.first().map(performer),
        bottom_performer: by_revenue.last().map(performer),
    }
}

fn recommend(spreads: &BTreeMap<String, ChannelSpread>) -> String {
    let variances: Vec<f64> = spreads.values().map(|s| s.variance).collect();
    let avg_variance = mean(&variances);

    if avg_variance < LOW_VARIANCE {
        "Models show similar results. Linear attribution is recommended for simplicity."
            .to_string()
    } else if avg_variance < MODERATE_VARIANCE {
        "Moderate variance between models. U-shaped attribution recommended to balance first and last touch."
            .to_string()
    } else {
        "High variance between models. Data-driven attribution recommended for accuracy."
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
