//! Dashboard metrics over daily channel history: period overviews with
//! period-over-period deltas, per-channel performance deep dives, and
//! weekly trend rollups.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use mmm_core::aggregate;
use mmm_core::error::{MmmError, MmmResult};
use mmm_core::stats::{mean, percentile, round2};
use mmm_core::store::HistoricalStore;
use mmm_core::types::{ChannelData, ChannelMetricRecord, Period};

/// Rolling step for marginal-ROAS estimation over the spend-sorted
/// series.
const MARGINAL_WINDOW: usize = 7;
/// A spend level is past its prime once marginal ROAS falls below this
/// share of the overall ROAS.
const DECLINING_ROAS_FACTOR: f64 = 0.8;
/// Spend percentile used when no declining point shows up.
const SPEND_PERCENTILE_FALLBACK: f64 = 90.0;
/// Spend deltas inside this band count as already optimized, $/day.
const OPTIMIZED_BAND: f64 = 100.0;
/// Days reported as best performers.
const BEST_DAYS: usize = 5;
/// Trailing days averaged for current daily spend.
const CURRENT_SPEND_DAYS: usize = 7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Change in one metric between two periods.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricChange {
    pub value: f64,
    pub percentage: f64,
}

impl MetricChange {
    /// Both fields are zero when there is no previous value to compare
    /// against.
    fn between(previous: f64, current: f64) -> Self {
        if previous == 0.0 {
            return Self {
                value: 0.0,
                percentage: 0.0,
            };
        }
        let value = current - previous;
        Self {
            value: round2(value),
            percentage: round2(value / previous * 100.0),
        }
    }
}

/// One channel's totals inside an overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOverviewRow {
    pub name: String,
    pub spend: f64,
    pub revenue: f64,
    pub conversions: f64,
    pub roas: f64,
    pub clicks: u64,
    pub impressions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub spend_change: MetricChange,
    pub revenue_change: MetricChange,
    pub roas_change: MetricChange,
}

/// High-level dashboard numbers for one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewReport {
    pub period: Period,
    pub total_spend: f64,
    pub total_revenue: f64,
    pub roas: f64,
    pub total_conversions: f64,
    pub channels: Vec<ChannelOverviewRow>,
    /// Deltas against the preceding window of equal length.
    pub period_comparison: PeriodComparison,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_spend: f64,
    pub total_revenue: f64,
    pub roas: f64,
    pub avg_daily_spend: f64,
    /// Spend level where marginal returns start declining.
    pub optimal_daily_spend: f64,
    /// Mean spend over the last observed days of the window.
    pub current_daily_spend: f64,
    pub opportunity: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub spend: f64,
    pub revenue: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeeklyPoint {
    pub week_start: NaiveDate,
    pub spend: f64,
    pub revenue: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub daily: Vec<DailyPoint>,
    pub weekly: Vec<WeeklyPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BestDay {
    pub date: NaiveDate,
    pub roas: f64,
    pub revenue: f64,
}

/// Deep dive into one channel over one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPerformanceReport {
    pub channel: String,
    pub period: Period,
    pub metrics: PerformanceMetrics,
    pub time_series: TimeSeries,
    pub best_performing_days: Vec<BestDay>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeeklyTrend {
    pub week_start: NaiveDate,
    pub spend: f64,
    pub revenue: f64,
    pub conversions: f64,
    pub roas: f64,
}

/// Recent weekly buckets for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendsReport {
    pub channel: String,
    pub period_days: i64,
    pub trends: Vec<WeeklyTrend>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Read-only reporting over the historical store.
pub struct InsightsEngine<S> {
    store: Arc<S>,
}

impl<S: HistoricalStore> InsightsEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Totals, per-channel rows, and period-over-period deltas for an
    /// inclusive `%Y-%m-%d` window.
    pub fn overview(&self, start: &str, end: &str) -> MmmResult<OverviewReport> {
        let period = Period::parse(start, end)?;
        let current = self.period_rollup(period)?;

        let days = period.days();
        let previous_period = Period::new(
            period.start - Duration::days(days),
            period.start - Duration::days(1),
        )?;
        let previous = self.period_rollup(previous_period)?;

        info!(%start, %end, channels = current.channels.len(), "overview computed");
        Ok(OverviewReport {
            period,
            total_spend: current.total_spend,
            total_revenue: current.total_revenue,
            roas: current.roas,
            total_conversions: current.total_conversions,
            channels: current.channels,
            period_comparison: PeriodComparison {
                spend_change: MetricChange::between(previous.total_spend, current.total_spend),
                revenue_change: MetricChange::between(
                    previous.total_revenue,
                    current.total_revenue,
                ),
                roas_change: MetricChange::between(previous.roas, current.roas),
            },
        })
    }

    /// Detailed metrics for one channel. A channel with no rows in the
    /// window is reported as an error, not an empty frame.
    pub fn channel_performance(
        &self,
        channel: &str,
        start: &str,
        end: &str,
    ) -> MmmResult<ChannelPerformanceReport> {
        let period = Period::parse(start, end)?;
        let rows = self.store.channel_records(channel, period)?;
        let totals = match aggregate::presence(&rows) {
            ChannelData::Present(totals) => totals,
            ChannelData::Absent => {
                return Err(MmmError::DataAbsent(format!(
                    "no data found for channel: {channel}"
                )))
            }
        };

        let spends: Vec<f64> = rows.iter().map(|r| r.spend).collect();
        let avg_daily_spend = mean(&spends);
        let optimal_daily_spend = optimal_spend(&rows, totals.spend, totals.revenue);
        let recent: Vec<f64> = rows
            .iter()
            .rev()
            .take(CURRENT_SPEND_DAYS)
            .map(|r| r.spend)
            .collect();
        let current_daily_spend = mean(&recent);

        let daily = rows
            .iter()
            .map(|r| DailyPoint {
                date: r.date,
                spend: r.spend,
                revenue: r.revenue,
                conversions: r.conversions,
            })
            .collect();
        let weekly = weekly_sums(&rows)
            .into_iter()
            .map(|(week_start, (spend, revenue, conversions))| WeeklyPoint {
                week_start,
                spend,
                revenue,
                conversions,
            })
            .collect();

        info!(%channel, rows = rows.len(), "channel performance computed");
        Ok(ChannelPerformanceReport {
            channel: channel.to_string(),
            period,
            metrics: PerformanceMetrics {
                total_spend: round2(totals.spend),
                total_revenue: round2(totals.revenue),
                roas: round2(totals.roas()),
                avg_daily_spend: round2(avg_daily_spend),
                optimal_daily_spend,
                current_daily_spend: round2(current_daily_spend),
                opportunity: opportunity(optimal_daily_spend, avg_daily_spend),
            },
            time_series: TimeSeries { daily, weekly },
            best_performing_days: best_days(&rows),
        })
    }

    /// Weekly buckets for one channel over the trailing `days`.
    pub fn channel_trends(&self, channel: &str, days: i64) -> MmmResult<TrendsReport> {
        let today = Utc::now().date_naive();
        let window = Period::trailing(today, days);
        let rows = self.store.channel_records(channel, window)?;

        let trends = weekly_sums(&rows)
            .into_iter()
            .map(|(week_start, (spend, revenue, conversions))| WeeklyTrend {
                week_start,
                spend,
                revenue,
                conversions,
                roas: if spend > 0.0 {
                    round2(revenue / spend)
                } else {
                    0.0
                },
            })
            .collect();
        Ok(TrendsReport {
            channel: channel.to_string(),
            period_days: days,
            trends,
        })
    }

    fn period_rollup(&self, period: Period) -> MmmResult<PeriodRollup> {
        let records = self.store.records_in(period)?;
        let totals = aggregate::by_channel(&records);

        let mut channels = Vec::with_capacity(totals.len());
        let mut total_spend = 0.0;
        let mut total_revenue = 0.0;
        let mut total_conversions = 0.0;
        for (name, sums) in &totals {
            channels.push(ChannelOverviewRow {
                name: name.clone(),
                spend: round2(sums.spend),
                revenue: round2(sums.revenue),
                conversions: sums.conversions,
                roas: round2(sums.roas()),
                clicks: sums.clicks,
                impressions: sums.impressions,
            });
            total_spend += sums.spend;
            total_revenue += sums.revenue;
            total_conversions += sums.conversions;
        }
        let roas = if total_spend > 0.0 {
            total_revenue / total_spend
        } else {
            0.0
        };
        Ok(PeriodRollup {
            total_spend: round2(total_spend),
            total_revenue: round2(total_revenue),
            total_conversions,
            roas: round2(roas),
            channels,
        })
    }
}

struct PeriodRollup {
    total_spend: f64,
    total_revenue: f64,
    total_conversions: f64,
    roas: f64,
    channels: Vec<ChannelOverviewRow>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Spend level where marginal returns start declining: the first spend
/// (ascending) whose rolling marginal ROAS drops below
/// `DECLINING_ROAS_FACTOR` of the overall ROAS, else the
/// `SPEND_PERCENTILE_FALLBACK` percentile of observed spend.
fn optimal_spend(rows: &[ChannelMetricRecord], total_spend: f64, total_revenue: f64) -> f64 {
    let mut by_spend: Vec<(f64, f64)> = rows.iter().map(|r| (r.spend, r.revenue)).collect();
    by_spend.sort_by(|a, b| a.0.total_cmp(&b.0));

    let overall_roas = if total_spend > 0.0 {
        total_revenue / total_spend
    } else {
        0.0
    };
    let threshold = overall_roas * DECLINING_ROAS_FACTOR;
    for i in MARGINAL_WINDOW..by_spend.len() {
        let marginal_spend = by_spend[i].0 - by_spend[i - MARGINAL_WINDOW].0;
        // Duplicate spend levels would make the ratio blow up.
        if marginal_spend <= 0.0 {
            continue;
        }
        let marginal_revenue = by_spend[i].1 - by_spend[i - MARGINAL_WINDOW].1;
        if marginal_revenue / marginal_spend < threshold {
            return round2(by_spend[i].0);
        }
    }

    let spends: Vec<f64> = rows.iter().map(|r| r.spend).collect();
    round2(percentile(&spends, SPEND_PERCENTILE_FALLBACK))
}

fn opportunity(optimal_spend: f64, avg_daily_spend: f64) -> String {
    let difference = optimal_spend - avg_daily_spend;
    if difference.abs() < OPTIMIZED_BAND {
        "Spend is optimized".to_string()
    } else if difference > 0.0 {
        format!("Increase by ${:.0}/day", difference.abs())
    } else {
        format!("Reduce by ${:.0}/day", difference.abs())
    }
}

/// Monday of the ISO week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// (spend, revenue, conversions) sums keyed by Monday week start.
fn weekly_sums(rows: &[ChannelMetricRecord]) -> BTreeMap<NaiveDate, (f64, f64, f64)> {
    let mut weeks: BTreeMap<NaiveDate, (f64, f64, f64)> = BTreeMap::new();
    for row in rows {
        let entry = weeks.entry(week_start(row.date)).or_default();
        entry.0 += row.spend;
        entry.1 += row.revenue;
        entry.2 += row.conversions;
    }
    weeks
}

/// Top days by single-day ROAS, ties kept in date order.
fn best_days(rows: &[ChannelMetricRecord]) -> Vec<BestDay> {
    let mut scored: Vec<(f64, &ChannelMetricRecord)> = rows
        .iter()
        .map(|r| {
            let roas = if r.spend > 0.0 { r.revenue / r.spend } else { 0.0 };
            (roas, r)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(BEST_DAYS)
        .map(|(roas, r)| BestDay {
            date: r.date,
            roas: round2(roas),
            revenue: r.revenue,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use mmm_core::store::MemoryStore;

    use super::*;

    fn row(date: NaiveDate, channel: &str, spend: f64, revenue: f64, conversions: f64) -> ChannelMetricRecord {
        ChannelMetricRecord {
            date,
            channel: channel.to_string(),
            spend,
            impressions: 2_000,
            clicks: 80,
            conversions,
            revenue,
            new_customers: 1,
            returning_customers: 1,
        }
    }

    fn june(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn may(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn engine(store: MemoryStore) -> InsightsEngine<MemoryStore> {
        InsightsEngine::new(Arc::new(store))
    }

    #[test]
    fn overview_compares_against_the_preceding_window() {
        let store = MemoryStore::new();
        // Previous window 2025-05-22..05-31: Google Ads only.
        for d in 22..=31 {
            store.upsert_record(row(may(d), "Google Ads", 50.0, 100.0, 2.0));
        }
        // Current window 2025-06-01..06-10: Google Ads plus Email.
        for d in 1..=10 {
            store.upsert_record(row(june(d), "Google Ads", 50.0, 100.0, 2.0));
            store.upsert_record(row(june(d), "Email", 10.0, 40.0, 1.0));
        }

        let report = engine(store).overview("2025-06-01", "2025-06-10").unwrap();

        // 1. Current-period totals.
        assert!((report.total_spend - 600.0).abs() < 1e-9);
        assert!((report.total_revenue - 1_400.0).abs() < 1e-9);
        assert!((report.roas - 2.33).abs() < 1e-9);
        assert!((report.total_conversions - 30.0).abs() < 1e-9);

        // 2. Channel rows in name order.
        assert_eq!(report.channels.len(), 2);
        assert_eq!(report.channels[0].name, "Email");
        assert!((report.channels[0].roas - 4.0).abs() < 1e-9);
        assert_eq!(report.channels[1].name, "Google Ads");
        assert!((report.channels[1].spend - 500.0).abs() < 1e-9);

        // 3. Deltas against 2025-05-22..05-31 (500 spend, 1000 revenue).
        let cmp = &report.period_comparison;
        assert!((cmp.spend_change.value - 100.0).abs() < 1e-9);
        assert!((cmp.spend_change.percentage - 20.0).abs() < 1e-9);
        assert!((cmp.revenue_change.value - 400.0).abs() < 1e-9);
        assert!((cmp.roas_change.value - 0.33).abs() < 1e-9);
        assert!((cmp.roas_change.percentage - 16.5).abs() < 1e-9);
    }

    #[test]
    fn overview_with_empty_previous_window_reports_zero_change() {
        let store = MemoryStore::new();
        for d in 1..=10 {
            store.upsert_record(row(june(d), "Email", 10.0, 40.0, 1.0));
        }

        let report = engine(store).overview("2025-06-01", "2025-06-10").unwrap();
        let cmp = &report.period_comparison;
        assert_eq!(cmp.spend_change.value, 0.0);
        assert_eq!(cmp.spend_change.percentage, 0.0);
        assert_eq!(cmp.revenue_change.value, 0.0);
        assert_eq!(cmp.roas_change.value, 0.0);
    }

    #[test]
    fn overview_rejects_malformed_dates() {
        let err = engine(MemoryStore::new())
            .overview("06/01/2025", "2025-06-10")
            .unwrap_err();
        assert!(matches!(err, MmmError::InvalidDate(_)));
    }

    /// Ten days of rising spend with revenue that flattens out after
    /// mid-range spend levels.
    fn concave_email_store() -> MemoryStore {
        let store = MemoryStore::new();
        let revenues = [
            500.0, 1_000.0, 1_500.0, 2_000.0, 2_500.0, 2_600.0, 2_700.0, 2_800.0, 2_900.0,
            3_000.0,
        ];
        for (i, revenue) in revenues.iter().enumerate() {
            let day = i as u32 + 1;
            store.upsert_record(row(june(day), "Email", 100.0 * day as f64, *revenue, 5.0));
        }
        store
    }

    #[test]
    fn channel_performance_finds_the_declining_spend_point() {
        let report = engine(concave_email_store())
            .channel_performance("Email", "2025-06-01", "2025-06-30")
            .unwrap();

        let metrics = &report.metrics;
        assert!((metrics.total_spend - 5_500.0).abs() < 1e-9);
        assert!((metrics.total_revenue - 21_500.0).abs() < 1e-9);
        assert!((metrics.roas - 3.91).abs() < 1e-9);
        assert!((metrics.avg_daily_spend - 550.0).abs() < 1e-9);
        // Marginal ROAS over a 7-day step first drops below 0.8x the
        // overall ROAS at the $900 spend level.
        assert!((metrics.optimal_daily_spend - 900.0).abs() < 1e-9);
        assert!((metrics.current_daily_spend - 700.0).abs() < 1e-9);
        assert_eq!(metrics.opportunity, "Increase by $350/day");
    }

    #[test]
    fn channel_performance_builds_time_series_and_best_days() {
        let report = engine(concave_email_store())
            .channel_performance("Email", "2025-06-01", "2025-06-30")
            .unwrap();

        // 1. Daily series mirrors the rows.
        assert_eq!(report.time_series.daily.len(), 10);
        assert_eq!(report.time_series.daily[0].date, june(1));

        // 2. Weekly rollups are Monday-keyed: 2025-06-01 is a Sunday,
        //    so it belongs to the week of May 26.
        let weekly = &report.time_series.weekly;
        assert_eq!(weekly.len(), 3);
        assert_eq!(weekly[0].week_start, may(26));
        assert!((weekly[0].spend - 100.0).abs() < 1e-9);
        assert_eq!(weekly[1].week_start, june(2));
        assert!((weekly[1].spend - 3_500.0).abs() < 1e-9);

        // 3. Early low-spend days carry the best ROAS, ties in date
        //    order.
        assert_eq!(report.best_performing_days.len(), 5);
        assert_eq!(report.best_performing_days[0].date, june(1));
        assert!((report.best_performing_days[0].roas - 5.0).abs() < 1e-9);
    }

    #[test]
    fn flat_roas_falls_back_to_the_spend_percentile() {
        let store = MemoryStore::new();
        for day in 1..=10 {
            let spend = 100.0 * day as f64;
            store.upsert_record(row(june(day), "TikTok", spend, spend * 3.0, 4.0));
        }
        let report = engine(store)
            .channel_performance("TikTok", "2025-06-01", "2025-06-30")
            .unwrap();

        // Constant marginal ROAS never declines; 90th percentile of
        // 100..1000 interpolates to 910.
        assert!((report.metrics.optimal_daily_spend - 910.0).abs() < 1e-9);
        assert_eq!(report.metrics.opportunity, "Increase by $360/day");
    }

    #[test]
    fn overspent_channel_is_told_to_reduce() {
        let store = MemoryStore::new();
        let mut revenues = vec![1_000.0, 2_000.0, 3_000.0];
        for i in 3..20 {
            revenues.push(3_000.0 + 100.0 * (i - 2) as f64);
        }
        for (i, revenue) in revenues.iter().enumerate() {
            let day = i as u32 + 1;
            store.upsert_record(row(june(day), "Meta Ads", 100.0 * day as f64, *revenue, 5.0));
        }
        let report = engine(store)
            .channel_performance("Meta Ads", "2025-06-01", "2025-06-30")
            .unwrap();

        assert!((report.metrics.optimal_daily_spend - 900.0).abs() < 1e-9);
        assert!((report.metrics.avg_daily_spend - 1_050.0).abs() < 1e-9);
        assert_eq!(report.metrics.opportunity, "Reduce by $150/day");
    }

    #[test]
    fn zero_spend_days_never_produce_infinite_roas() {
        let store = MemoryStore::new();
        store.upsert_record(row(june(1), "Email", 0.0, 500.0, 1.0));
        store.upsert_record(row(june(2), "Email", 100.0, 200.0, 1.0));
        let report = engine(store)
            .channel_performance("Email", "2025-06-01", "2025-06-30")
            .unwrap();

        // The zero-spend day scores 0, so the paid day ranks first.
        assert_eq!(report.best_performing_days[0].date, june(2));
        assert!((report.best_performing_days[0].roas - 2.0).abs() < 1e-9);
        assert!((report.best_performing_days[1].roas - 0.0).abs() < 1e-9);
        assert_eq!(report.metrics.opportunity, "Spend is optimized");
    }

    #[test]
    fn unknown_channel_is_a_structured_error() {
        let err = engine(MemoryStore::new())
            .channel_performance("Podcast", "2025-06-01", "2025-06-30")
            .unwrap_err();
        assert!(matches!(err, MmmError::DataAbsent(message) if message.contains("Podcast")));
    }

    #[test]
    fn trends_bucket_by_monday_weeks() {
        let store = MemoryStore::new();
        let today = Utc::now().date_naive();
        for days_ago in 1..=28 {
            store.upsert_record(row(
                today - Duration::days(days_ago),
                "Email",
                100.0,
                400.0,
                2.0,
            ));
        }
        let report = engine(store).channel_trends("Email", 30).unwrap();

        assert_eq!(report.period_days, 30);
        assert!(!report.trends.is_empty());
        let total_spend: f64 = report.trends.iter().map(|t| t.spend).sum();
        assert!((total_spend - 2_800.0).abs() < 1e-9);
        for trend in &report.trends {
            assert_eq!(trend.week_start.weekday(), Weekday::Mon);
            assert!((trend.roas - 4.0).abs() < 1e-9);
        }
        for pair in report.trends.windows(2) {
            assert!(pair[0].week_start < pair[1].week_start);
        }
    }

    #[test]
    fn trends_for_a_quiet_channel_are_empty_not_an_error() {
        let report = engine(MemoryStore::new()).channel_trends("Email", 30).unwrap();
        assert!(report.trends.is_empty());
    }
}
