//! The five credit-splitting models. Each strategy turns per-channel
//! window totals into raw credit weights; the engine owns the shared
//! normalization into shares and attributed values.

use mmm_core::config::ChannelPriors;
use mmm_core::types::{AttributionModel, ChannelTotals};

/// Credit assigned to the opening touch in the u-shaped split.
const FIRST_TOUCH_SHARE: f64 = 0.4;
/// Credit assigned to the closing touch in the u-shaped split.
const LAST_TOUCH_SHARE: f64 = 0.4;
/// Credit spread evenly across middle touches in the u-shaped split.
const MIDDLE_SHARE: f64 = 0.2;

/// How a model's credit maps back to attributed conversions/revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditBasis {
    /// Each channel keeps its own observed totals; weights drive the
    /// percentage split only.
    OwnTotals,
    /// Period totals are split across channels by normalized weight.
    SharedTotals,
}

/// A credit-splitting model. One capability, one shared record shape:
/// `weigh` returns a raw, non-negative, finite weight per input channel,
/// in input order.
pub trait AttributionStrategy: Send + Sync {
    fn model(&self) -> AttributionModel;

    fn basis(&self) -> CreditBasis;

    fn weigh(&self, channels: &[(String, ChannelTotals)]) -> Vec<f64>;
}

/// Build the strategy for `model` against the given prior tables.
pub fn strategy_for(
    model: AttributionModel,
    priors: &ChannelPriors,
) -> Box<dyn AttributionStrategy> {
    match model {
        AttributionModel::LastClick => Box::new(LastClick),
        AttributionModel::Linear => Box::new(Linear),
        AttributionModel::TimeDecay => Box::new(TimeDecay),
        AttributionModel::UShaped => Box::new(UShaped::new(priors.clone())),
        AttributionModel::DataDriven => Box::new(DataDriven),
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Full credit to the converting channel: each channel keeps its own
/// totals, and percentages follow its share of observed conversions.
pub struct LastClick;

impl AttributionStrategy for LastClick {
    fn model(&self) -> AttributionModel {
        AttributionModel::LastClick
    }

    fn basis(&self) -> CreditBasis {
        CreditBasis::OwnTotals
    }

    fn weigh(&self, channels: &[(String, ChannelTotals)]) -> Vec<f64> {
        channels.iter().map(|(_, totals)| totals.conversions).collect()
    }
}

/// Equal credit to every channel present in the window.
pub struct Linear;

impl AttributionStrategy for Linear {
    fn model(&self) -> AttributionModel {
        AttributionModel::Linear
    }

    fn basis(&self) -> CreditBasis {
        CreditBasis::SharedTotals
    }

    fn weigh(&self, channels: &[(String, ChannelTotals)]) -> Vec<f64> {
        vec![1.0; channels.len()]
    }
}

/// Recency-weighted credit. Only aggregated totals exist at this grain,
/// so a channel's same-period conversion share stands in for recency:
/// channels converting now are the ones reached most recently.
pub struct TimeDecay;

impl AttributionStrategy for TimeDecay {
    fn model(&self) -> AttributionModel {
        AttributionModel::TimeDecay
    }

    fn basis(&self) -> CreditBasis {
        CreditBasis::OwnTotals
    }

    fn weigh(&self, channels: &[(String, ChannelTotals)]) -> Vec<f64> {
        channels.iter().map(|(_, totals)| totals.conversions).collect()
    }
}

/// Position-based split: 40% to the likely opener, 40% to the likely
/// closer, 20% spread across the middle. Opener/closer likelihoods come
/// from the configured prior tables.
pub struct UShaped {
    priors: ChannelPriors,
}

impl UShaped {
    pub fn new(priors: ChannelPriors) -> Self {
        Self { priors }
    }
}

impl AttributionStrategy for UShaped {
    fn model(&self) -> AttributionModel {
        AttributionModel::UShaped
    }

    fn basis(&self) -> CreditBasis {
        CreditBasis::SharedTotals
    }

    fn weigh(&self, channels: &[(String, ChannelTotals)]) -> Vec<f64> {
        let middle = MIDDLE_SHARE / channels.len().max(1) as f64;
        channels
            .iter()
            .map(|(name, _)| {
                FIRST_TOUCH_SHARE * self.priors.first_touch_weight(name)
                    + LAST_TOUCH_SHARE * self.priors.last_touch_weight(name)
                    + middle
            })
            .collect()
    }
}

/// Efficiency-scored credit: a channel's score is its conversion rate
/// times its conversion volume, so high-volume, high-efficiency channels
/// earn outsized credit. All-zero scores fall back to a uniform split.
pub struct DataDriven;

impl AttributionStrategy for DataDriven {
    fn model(&self) -> AttributionModel {
        AttributionModel::DataDriven
    }

    fn basis(&self) -> CreditBasis {
        CreditBasis::SharedTotals
    }

    fn weigh(&self, channels: &[(String, ChannelTotals)]) -> Vec<f64> {
        let scores: Vec<f64> = channels
            .iter()
            .map(|(_, totals)| {
                let rate = if totals.clicks > 0 {
                    totals.conversions / totals.clicks as f64
                } else {
                    0.0
                };
                rate * totals.conversions
            })
            .collect();

        if scores.iter().sum::<f64>() > 0.0 {
            scores
        } else {
            vec![1.0; channels.len()]
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
