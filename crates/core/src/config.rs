use std::collections::BTreeMap;

use serde::Deserialize;

/// Position prior applied to channels missing from the configured tables.
const DEFAULT_PRIOR: f64 = 0.2;

/// Root engine configuration. Loaded from environment variables with the
/// prefix `MMM__`. Every field has a default, so `EngineConfig::default()`
/// is a complete, usable configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub channels: ChannelPriors,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

// ─── Channel Priors ─────────────────────────────────────────────────────

/// Channel roster plus business-configured position priors. First/last
/// touch priors estimate how often a channel opens or closes a journey;
/// spend floors are contractual minimum daily budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelPriors {
    #[serde(default = "default_channel_roster")]
    pub default_channels: Vec<String>,
    #[serde(default = "default_first_touch_priors")]
    pub first_touch: BTreeMap<String, f64>,
    #[serde(default = "default_last_touch_priors")]
    pub last_touch: BTreeMap<String, f64>,
    #[serde(default = "default_spend_floors")]
    pub spend_floors: BTreeMap<String, f64>,
}

impl ChannelPriors {
    /// First-touch prior for a channel, falling back to the neutral prior
    /// for channels outside the configured table.
    pub fn first_touch_weight(&self, channel: &str) -> f64 {
        self.first_touch.get(channel).copied().unwrap_or(DEFAULT_PRIOR)
    }

    /// Last-touch prior for a channel, with the same fallback.
    pub fn last_touch_weight(&self, channel: &str) -> f64 {
        self.last_touch.get(channel).copied().unwrap_or(DEFAULT_PRIOR)
    }

    /// Minimum daily spend for a channel, zero when unconfigured.
    pub fn spend_floor(&self, channel: &str) -> f64 {
        self.spend_floors.get(channel).copied().unwrap_or(0.0)
    }
}

fn default_channel_roster() -> Vec<String> {
    vec![
        "Google Ads".to_string(),
        "Meta Ads".to_string(),
        "Email".to_string(),
        "TikTok".to_string(),
        "Affiliate".to_string(),
    ]
}

fn default_first_touch_priors() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("Google Ads".to_string(), 0.35),
        ("Meta Ads".to_string(), 0.30),
        ("TikTok".to_string(), 0.25),
        ("Email".to_string(), 0.05),
        ("Affiliate".to_string(), 0.05),
    ])
}

fn default_last_touch_priors() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("Google Ads".to_string(), 0.30),
        ("Meta Ads".to_string(), 0.20),
        ("Email".to_string(), 0.25),
        ("Affiliate".to_string(), 0.20),
        ("TikTok".to_string(), 0.05),
    ])
}

fn default_spend_floors() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("Google Ads".to_string(), 1000.0),
        ("Meta Ads".to_string(), 500.0),
        ("Email".to_string(), 10.0),
        ("TikTok".to_string(), 200.0),
        ("Affiliate".to_string(), 0.0),
    ])
}

impl Default for ChannelPriors {
    fn default() -> Self {
        Self {
            default_channels: default_channel_roster(),
            first_touch: default_first_touch_priors(),
            last_touch: default_last_touch_priors(),
            spend_floors: default_spend_floors(),
        }
    }
}

// ─── Optimizer Config ───────────────────────────────────────────────────

/// Tuning knobs for response-curve fitting and budget allocation.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    /// Trailing window of history used to fit response curves, in days.
    #[serde(default = "default_curve_window_days")]
    pub curve_window_days: i64,
    /// Minimum raw observations before a curve fit is attempted.
    #[serde(default = "default_min_curve_samples")]
    pub min_curve_samples: usize,
    /// Minimum observations that must survive outlier trimming.
    #[serde(default = "default_min_trimmed_samples")]
    pub min_trimmed_samples: usize,
    /// IQR fence multiplier for revenue outlier trimming.
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,
    /// Marginal ROAS at which a channel is considered saturated.
    #[serde(default = "default_marginal_roas_threshold")]
    pub marginal_roas_threshold: f64,
    /// Hard ceiling on any derived saturation point, in dollars/day.
    #[serde(default = "default_saturation_cap")]
    pub saturation_cap: f64,
    /// Saturation assumed for channels without a viable curve.
    #[serde(default = "default_fallback_saturation")]
    pub fallback_saturation: f64,
    /// Flat ROAS assumed for channels without a viable curve.
    #[serde(default = "default_fallback_roas")]
    pub fallback_roas: f64,
    /// Iteration cap for the allocation solver.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Absolute tolerance on the allocated total vs. the requested budget.
    #[serde(default = "default_budget_tolerance")]
    pub budget_tolerance: f64,
    /// No channel may receive more than this share of the total budget.
    #[serde(default = "default_max_channel_share")]
    pub max_channel_share: f64,
    /// Trailing window for the current-revenue baseline, in days.
    #[serde(default = "default_current_revenue_window_days")]
    pub current_revenue_window_days: i64,
    /// Trailing window for current-spend averages in recommendations.
    #[serde(default = "default_recommendation_window_days")]
    pub recommendation_window_days: i64,
    /// Spend shifts smaller than this are not worth recommending, $/day.
    #[serde(default = "default_min_recommendation_delta")]
    pub min_recommendation_delta: f64,
    /// Spend shifts above this are flagged high priority, $/day.
    #[serde(default = "default_high_priority_delta")]
    pub high_priority_delta: f64,
}

fn default_curve_window_days() -> i64 { 90 }
fn default_min_curve_samples() -> usize { 10 }
fn default_min_trimmed_samples() -> usize { 5 }
fn default_iqr_multiplier() -> f64 { 1.5 }
fn default_marginal_roas_threshold() -> f64 { 0.1 }
fn default_saturation_cap() -> f64 { 20_000.0 }
fn default_fallback_saturation() -> f64 { 10_000.0 }
fn default_fallback_roas() -> f64 { 5.0 }
fn default_max_iterations() -> usize { 200 }
fn default_budget_tolerance() -> f64 { 1e-2 }
fn default_max_channel_share() -> f64 { 0.5 }
fn default_current_revenue_window_days() -> i64 { 30 }
fn default_recommendation_window_days() -> i64 { 7 }
fn default_min_recommendation_delta() -> f64 { 100.0 }
fn default_high_priority_delta() -> f64 { 1000.0 }

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            curve_window_days: default_curve_window_days(),
            min_curve_samples: default_min_curve_samples(),
            min_trimmed_samples: default_min_trimmed_samples(),
            iqr_multiplier: default_iqr_multiplier(),
            marginal_roas_threshold: default_marginal_roas_threshold(),
            saturation_cap: default_saturation_cap(),
            fallback_saturation: default_fallback_saturation(),
            fallback_roas: default_fallback_roas(),
            max_iterations: default_max_iterations(),
            budget_tolerance: default_budget_tolerance(),
            max_channel_share: default_max_channel_share(),
            current_revenue_window_days: default_current_revenue_window_days(),
            recommendation_window_days: default_recommendation_window_days(),
            min_recommendation_delta: default_min_recommendation_delta(),
            high_priority_delta: default_high_priority_delta(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: ChannelPriors::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, e.g.
    /// `MMM__OPTIMIZER__MAX_ITERATIONS=500`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("MMM")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
