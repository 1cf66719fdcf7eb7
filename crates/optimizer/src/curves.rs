//! Diminishing-returns response curves fitted from daily channel history.
//!
//! Each channel's daily (spend, revenue) pairs over a trailing window are
//! fitted to `revenue = a * ln(spend + 1) + b` by least squares, after IQR
//! outlier trimming on revenue. Channels with too little usable history get
//! a flat-ROAS fallback model so the rest of the engine can still price
//! their spend.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mmm_core::config::OptimizerConfig;
use mmm_core::stats::{mean, percentile};
use mmm_core::store::HistoricalStore;
use mmm_core::types::Period;
use mmm_core::MmmResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fitted logarithmic response curve for one channel.
///
/// `revenue_at(spend) = a * ln(spend + 1) + b`. The `+ 1` keeps the curve
/// defined at zero spend, where it predicts exactly `b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCurve {
    pub channel: String,
    /// Log coefficient: revenue gained per unit of `ln(spend + 1)`.
    pub a: f64,
    /// Intercept: predicted revenue at zero spend.
    pub b: f64,
    /// Daily spend at which marginal ROAS falls to the configured
    /// threshold. Spending past this point returns less than the
    /// threshold per incremental dollar.
    pub saturation_point: f64,
    /// Mean daily spend over the fit window, before outlier trimming.
    pub current_avg_spend: f64,
    /// Mean daily revenue over the fit window, before outlier trimming.
    pub current_avg_revenue: f64,
}

impl ResponseCurve {
    /// Predicted daily revenue at a spend level.
    pub fn revenue_at(&self, spend: f64) -> f64 {
        self.a * (spend + 1.0).ln() + self.b
    }

    /// Marginal revenue per incremental dollar at a spend level.
    pub fn marginal_at(&self, spend: f64) -> f64 {
        self.a / (spend + 1.0)
    }
}

/// Revenue model backing one channel: a fitted curve, or a flat-ROAS
/// fallback when the window holds too little usable history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelModel {
    Curve(ResponseCurve),
    LinearFallback { roas: f64 },
}

impl ChannelModel {
    pub fn revenue_at(&self, spend: f64) -> f64 {
        match self {
            ChannelModel::Curve(curve) => curve.revenue_at(spend),
            ChannelModel::LinearFallback { roas } => spend * roas,
        }
    }

    pub fn as_curve(&self) -> Option<&ResponseCurve> {
        match self {
            ChannelModel::Curve(curve) => Some(curve),
            ChannelModel::LinearFallback { .. } => None,
        }
    }
}

/// Channel models fitted from one window, keyed by channel name.
#[derive(Debug, Clone)]
pub struct CurveSet {
    models: BTreeMap<String, ChannelModel>,
    default_roas: f64,
}

impl CurveSet {
    pub fn new(default_roas: f64) -> Self {
        Self {
            models: BTreeMap::new(),
            default_roas,
        }
    }

    pub fn insert(&mut self, channel: String, model: ChannelModel) {
        self.models.insert(channel, model);
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelModel> {
        self.models.get(channel)
    }

    pub fn models(&self) -> &BTreeMap<String, ChannelModel> {
        &self.models
    }

    /// Fitted curves only, fallback channels skipped.
    pub fn curves(&self) -> impl Iterator<Item = (&str, &ResponseCurve)> {
        self.models
            .iter()
            .filter_map(|(name, model)| model.as_curve().map(|curve| (name.as_str(), curve)))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Total projected daily revenue of an allocation. Channels without
    /// any model are priced at the default flat ROAS.
    pub fn projected_revenue(&self, allocation: &BTreeMap<String, f64>) -> f64 {
        allocation
            .iter()
            .map(|(channel, spend)| match self.models.get(channel) {
                Some(model) => model.revenue_at(*spend),
                None => spend * self.default_roas,
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Fitter
// ---------------------------------------------------------------------------

/// Fits per-channel response curves from the historical store.
pub struct ResponseCurveFitter<S> {
    store: Arc<S>,
    config: OptimizerConfig,
}

impl<S: HistoricalStore> ResponseCurveFitter<S> {
    pub fn new(store: Arc<S>, config: OptimizerConfig) -> Self {
        Self { store, config }
    }

    /// Fit a model for every channel with history in the trailing window
    /// ending at `end`. Channels with no rows in the window do not appear
    /// in the returned set.
    pub fn fit_window(&self, end: NaiveDate) -> MmmResult<CurveSet> {
        let window = Period::trailing(end, self.config.curve_window_days);
        let records = self.store.records_in(window)?;

        let mut samples: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
        for record in &records {
            samples
                .entry(record.channel.clone())
                .or_default()
                .push((record.spend, record.revenue));
        }

        let mut set = CurveSet::new(self.config.fallback_roas);
        for (channel, points) in samples {
            let model = match self.fit_channel(&channel, &points) {
                Some(curve) => ChannelModel::Curve(curve),
                None => ChannelModel::LinearFallback {
                    roas: self.config.fallback_roas,
                },
            };
            set.insert(channel, model);
        }
        info!(
            %end,
            channels = set.len(),
            fitted = set.curves().count(),
            "fitted response curves"
        );
        Ok(set)
    }

    /// Fit one channel's curve, or `None` when a sample gate fails.
    fn fit_channel(&self, channel: &str, points: &[(f64, f64)]) -> Option<ResponseCurve> {
        if points.len() <= self.config.min_curve_samples {
            debug!(%channel, samples = points.len(), "too few samples for a curve fit");
            return None;
        }

        let revenues: Vec<f64> = points.iter().map(|(_, revenue)| *revenue).collect();
        let q1 = percentile(&revenues, 25.0);
        let q3 = percentile(&revenues, 75.0);
        let fence = self.config.iqr_multiplier * (q3 - q1);
        let (low, high) = (q1 - fence, q3 + fence);
        let kept: Vec<(f64, f64)> = points
            .iter()
            .filter(|(_, revenue)| *revenue >= low && *revenue <= high)
            .copied()
            .collect();
        if kept.len() <= self.config.min_trimmed_samples {
            debug!(%channel, kept = kept.len(), "too few samples after outlier trimming");
            return None;
        }

        let x = Array1::from_iter(kept.iter().map(|(spend, _)| (spend + 1.0).ln()));
        let y = Array1::from_iter(kept.iter().map(|(_, revenue)| *revenue));
        let x_mean = x.mean().unwrap_or(0.0);
        let y_mean = y.mean().unwrap_or(0.0);
        let centered_x = &x - x_mean;
        let centered_y = &y - y_mean;
        let ss_x = centered_x.mapv(|v| v * v).sum();
        // Every kept day spent the same amount: the slope is
        // indeterminate, treat the channel as flat.
        let a = if ss_x > 0.0 {
            (&centered_x * &centered_y).sum() / ss_x
        } else {
            0.0
        };
        let b = y_mean - a * x_mean;

        let saturation_point = if a > 0.0 {
            (a / self.config.marginal_roas_threshold - 1.0).clamp(0.0, self.config.saturation_cap)
        } else {
            self.config.fallback_saturation
        };

        let spends: Vec<f64> = points.iter().map(|(spend, _)| *spend).collect();
        Some(ResponseCurve {
            channel: channel.to_string(),
            a,
            b,
            saturation_point,
            current_avg_spend: mean(&spends),
            current_avg_revenue: mean(&revenues),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use mmm_core::store::MemoryStore;
    use mmm_core::types::ChannelMetricRecord;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn record(days_ago: i64, channel: &str, spend: f64, revenue: f64) -> ChannelMetricRecord {
        ChannelMetricRecord {
            date: Utc::now().date_naive() - Duration::days(days_ago),
            channel: channel.to_string(),
            spend,
            impressions: (spend * 50.0) as u64,
            clicks: (spend / 2.0) as u64,
            conversions: revenue / 120.0,
            revenue,
            new_customers: 0,
            returning_customers: 0,
        }
    }

    /// Noise-free logarithmic history: revenue = a * ln(spend + 1) + b.
    fn seeded_store(channel: &str, a: f64, b: f64, days: i64) -> MemoryStore {
        let store = MemoryStore::new();
        for day in 1..=days {
            let spend = 500.0 + 100.0 * (day % 7) as f64;
            let revenue = a * (spend + 1.0).ln() + b;
            store.upsert_record(record(day, channel, spend, revenue));
        }
        store
    }

    #[test]
    fn fit_recovers_logarithmic_coefficients() {
        let store = Arc::new(seeded_store("Email", 900.0, 150.0, 60));
        let fitter = ResponseCurveFitter::new(store, OptimizerConfig::default());
        let set = fitter.fit_window(Utc::now().date_naive()).unwrap();

        let curve = set.get("Email").unwrap().as_curve().unwrap();
        assert!((curve.a - 900.0).abs() < 1e-6);
        assert!((curve.b - 150.0).abs() < 1e-6);
        // Marginal ROAS hits the 0.1 threshold at a / 0.1 - 1.
        assert!((curve.saturation_point - 8_999.0).abs() < 1e-6);
    }

    #[test]
    fn outlier_days_are_trimmed_before_fitting() {
        let store = seeded_store("Email", 900.0, 150.0, 40);
        // A tracking glitch books wildly inflated revenue on one day.
        store.upsert_record(record(41, "Email", 800.0, 250_000.0));
        let fitter = ResponseCurveFitter::new(Arc::new(store), OptimizerConfig::default());
        let set = fitter.fit_window(Utc::now().date_naive()).unwrap();

        let curve = set.get("Email").unwrap().as_curve().unwrap();
        assert!((curve.a - 900.0).abs() < 1e-6);
        // Averages are taken before trimming, so the glitch day counts.
        assert!(curve.current_avg_revenue > 6_000.0);
    }

    #[test]
    fn sparse_channels_fall_back_to_flat_roas() {
        let store = MemoryStore::new();
        for day in 1..=8 {
            store.upsert_record(record(day, "TikTok", 200.0, 900.0));
        }
        let fitter = ResponseCurveFitter::new(Arc::new(store), OptimizerConfig::default());
        let set = fitter.fit_window(Utc::now().date_naive()).unwrap();

        match set.get("TikTok").unwrap() {
            ChannelModel::LinearFallback { roas } => assert!((*roas - 5.0).abs() < 1e-12),
            ChannelModel::Curve(_) => panic!("8 samples must not produce a curve"),
        }
        assert_eq!(set.curves().count(), 0);
    }

    #[test]
    fn trimmed_sample_gate_uses_config() {
        let store = seeded_store("Email", 900.0, 150.0, 12);
        let config = OptimizerConfig {
            min_trimmed_samples: 15,
            ..OptimizerConfig::default()
        };
        let fitter = ResponseCurveFitter::new(Arc::new(store), config);
        let set = fitter.fit_window(Utc::now().date_naive()).unwrap();

        assert!(matches!(
            set.get("Email"),
            Some(ChannelModel::LinearFallback { .. })
        ));
    }

    #[test]
    fn noisy_history_still_recovers_the_trend() {
        let mut rng = StdRng::seed_from_u64(7);
        let store = MemoryStore::new();
        for day in 1..=80 {
            let spend = rng.gen_range(200.0..4_000.0);
            let noise = rng.gen_range(-150.0..150.0);
            let revenue = 1_200.0 * (spend + 1.0_f64).ln() + 300.0 + noise;
            store.upsert_record(record(day, "Google Ads", spend, revenue));
        }
        let fitter = ResponseCurveFitter::new(Arc::new(store), OptimizerConfig::default());
        let set = fitter.fit_window(Utc::now().date_naive()).unwrap();

        let curve = set.get("Google Ads").unwrap().as_curve().unwrap();
        assert!((curve.a - 1_200.0).abs() < 120.0);
        assert!(curve.marginal_at(0.0) > curve.marginal_at(curve.saturation_point));
    }

    #[test]
    fn stale_history_outside_the_window_is_ignored() {
        let store = seeded_store("Email", 900.0, 150.0, 8);
        // Plenty of rows, but all older than the 90-day window.
        for day in 100..=160 {
            store.upsert_record(record(day, "Email", 700.0, 6_000.0));
        }
        let fitter = ResponseCurveFitter::new(Arc::new(store), OptimizerConfig::default());
        let set = fitter.fit_window(Utc::now().date_naive()).unwrap();

        assert!(matches!(
            set.get("Email"),
            Some(ChannelModel::LinearFallback { .. })
        ));
    }

    #[test]
    fn projected_revenue_prices_fallback_and_unknown_channels() {
        let mut set = CurveSet::new(5.0);
        set.insert(
            "Email".to_string(),
            ChannelModel::Curve(ResponseCurve {
                channel: "Email".to_string(),
                a: 100.0,
                b: 50.0,
                saturation_point: 999.0,
                current_avg_spend: 80.0,
                current_avg_revenue: 480.0,
            }),
        );
        set.insert("TikTok".to_string(), ChannelModel::LinearFallback { roas: 5.0 });

        let allocation = BTreeMap::from([
            ("Email".to_string(), 99.0),
            ("TikTok".to_string(), 40.0),
            ("Podcast".to_string(), 10.0),
        ]);
        let expected = 100.0 * 100.0_f64.ln() + 50.0 + 40.0 * 5.0 + 10.0 * 5.0;
        assert!((set.projected_revenue(&allocation) - expected).abs() < 1e-9);
    }
}
