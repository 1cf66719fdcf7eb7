use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MmmError, MmmResult};

/// One day of delivery totals for a single marketing channel. The
/// `(date, channel)` pair identifies the row; re-ingesting it replaces
/// the previous version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetricRecord {
    pub date: NaiveDate,
    pub channel: String,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    pub revenue: f64,
    #[serde(default)]
    pub new_customers: u64,
    #[serde(default)]
    pub returning_customers: u64,
}

/// Window sums for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelTotals {
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    pub revenue: f64,
}

impl ChannelTotals {
    pub fn accumulate(&mut self, record: &ChannelMetricRecord) {
        self.spend += record.spend;
        self.impressions += record.impressions;
        self.clicks += record.clicks;
        self.conversions += record.conversions;
        self.revenue += record.revenue;
    }

    /// Revenue per dollar of spend, zero when nothing was spent.
    pub fn roas(&self) -> f64 {
        if self.spend > 0.0 {
            self.revenue / self.spend
        } else {
            0.0
        }
    }
}

/// Aggregation outcome for a channel over a window. `Absent` means the
/// channel had no rows at all, which is not the same as rows summing to
/// zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelData {
    Present(ChannelTotals),
    Absent,
}

impl ChannelData {
    pub fn totals(&self) -> Option<&ChannelTotals> {
        match self {
            ChannelData::Present(totals) => Some(totals),
            ChannelData::Absent => None,
        }
    }
}

/// Attribution models supported by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    LastClick,
    Linear,
    TimeDecay,
    UShaped,
    DataDriven,
}

impl AttributionModel {
    /// All models, in the order reported by model comparison.
    pub const ALL: [AttributionModel; 5] = [
        AttributionModel::LastClick,
        AttributionModel::Linear,
        AttributionModel::TimeDecay,
        AttributionModel::UShaped,
        AttributionModel::DataDriven,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionModel::LastClick => "last_click",
            AttributionModel::Linear => "linear",
            AttributionModel::TimeDecay => "time_decay",
            AttributionModel::UShaped => "u_shaped",
            AttributionModel::DataDriven => "data_driven",
        }
    }
}

impl fmt::Display for AttributionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributionModel {
    type Err = MmmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_click" => Ok(AttributionModel::LastClick),
            "linear" => Ok(AttributionModel::Linear),
            "time_decay" => Ok(AttributionModel::TimeDecay),
            "u_shaped" => Ok(AttributionModel::UShaped),
            "data_driven" => Ok(AttributionModel::DataDriven),
            other => Err(MmmError::UnknownModel(other.to_string())),
        }
    }
}

/// Per-channel attribution shares for one model over one period. Every
/// model emits this same shape. Conversions are whole units (fractional
/// credit truncates); revenue and percentage carry two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub channel: String,
    pub attributed_conversions: u64,
    pub attributed_revenue: f64,
    /// Share of total credit, 0..=100.
    pub percentage: f64,
}

/// A persisted attribution row, one per channel for a model/period-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAttribution {
    pub id: Uuid,
    pub date: NaiveDate,
    pub channel: String,
    pub model: AttributionModel,
    pub attributed_conversions: u64,
    pub attributed_revenue: f64,
    pub created_at: DateTime<Utc>,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> MmmResult<Self> {
        if start > end {
            return Err(MmmError::InvalidDate(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `%Y-%m-%d` endpoints into a validated inclusive period.
    pub fn parse(start: &str, end: &str) -> MmmResult<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .map_err(|_| MmmError::InvalidDate(start.to_string()))?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .map_err(|_| MmmError::InvalidDate(end.to_string()))?;
        Self::new(start, end)
    }

    /// Trailing window equivalent to a `date >= end - days` filter,
    /// endpoints inclusive.
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - Duration::days(days.max(0)),
            end,
        }
    }

    /// Number of calendar days covered, counting both endpoints.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
