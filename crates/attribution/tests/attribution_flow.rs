//! Integration test for the full attribution flow: string-typed entry
//! points over an in-memory store, result persistence, and the
//! five-model comparison.

use std::sync::Arc;

use chrono::NaiveDate;
use mmm_attribution::AttributionEngine;
use mmm_core::store::{HistoricalStore, MemoryStore};
use mmm_core::types::{AttributionModel, ChannelMetricRecord};
use mmm_core::EngineConfig;

fn record(day: u32, channel: &str, conversions: f64, clicks: u64, revenue: f64) -> ChannelMetricRecord {
    ChannelMetricRecord {
        date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
        channel: channel.to_string(),
        spend: revenue / 4.0,
        impressions: clicks * 25,
        clicks,
        conversions,
        revenue,
        new_customers: 1,
        returning_customers: 0,
    }
}

/// June 2025 history across three channels with uneven efficiency.
fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.upsert_records([
        record(3, "Google Ads", 80.0, 600, 4_000.0),
        record(11, "Google Ads", 40.0, 300, 2_000.0),
        record(5, "Meta Ads", 30.0, 500, 1_200.0),
        record(18, "Meta Ads", 30.0, 500, 1_300.0),
        record(9, "Email", 50.0, 100, 1_500.0),
    ]);
    Arc::new(store)
}

fn june_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
}

#[test]
fn calculate_attribution_runs_the_whole_pipeline() {
    let engine = AttributionEngine::new(seeded_store(), EngineConfig::default());
    let report = engine
        .calculate_attribution("2025-06-01", "2025-06-30", "last_click")
        .unwrap();

    assert_eq!(report.model, AttributionModel::LastClick);
    assert_eq!(report.results.len(), 3);

    // Each channel keeps its own totals under last_click.
    let google = report
        .results
        .iter()
        .find(|r| r.channel == "Google Ads")
        .unwrap();
    assert_eq!(google.attributed_conversions, 120);
    assert!((google.attributed_revenue - 6_000.0).abs() < 1e-9);

    let percentage_sum: f64 = report.results.iter().map(|r| r.percentage).sum();
    assert!((percentage_sum - 100.0).abs() < 0.05);

    let conversion_sum: u64 = report
        .results
        .iter()
        .map(|r| r.attributed_conversions)
        .sum();
    assert_eq!(conversion_sum, 230);

    assert_eq!(report.summary.top_performer.unwrap().channel, "Google Ads");
}

#[test]
fn stored_rows_match_the_returned_report() {
    let store = seeded_store();
    let engine = AttributionEngine::new(Arc::clone(&store), EngineConfig::default());

    let report = engine
        .calculate_attribution("2025-06-01", "2025-06-30", "linear")
        .unwrap();

    // The store now holds the same set, keyed by the period end.
    let stored = store
        .attribution_rows(AttributionModel::Linear, june_end())
        .unwrap();
    assert_eq!(stored.len(), report.results.len());
    for (row, result) in stored.iter().zip(&report.results) {
        assert_eq!(row.channel, result.channel);
        assert_eq!(row.attributed_conversions, result.attributed_conversions);
        assert!((row.attributed_revenue - result.attributed_revenue).abs() < 1e-9);
        assert_eq!(row.model, AttributionModel::Linear);
        assert_eq!(row.date, june_end());
    }
}

#[test]
fn comparison_refreshes_every_model_set() {
    let store = seeded_store();
    let engine = AttributionEngine::new(Arc::clone(&store), EngineConfig::default());
    let comparison = engine
        .compare_attribution_models("2025-06-01", "2025-06-30")
        .unwrap();

    assert_eq!(comparison.models.len(), 5);
    assert_eq!(comparison.channel_variance.len(), 3);
    assert!(!comparison.recommendation.is_empty());

    for model in AttributionModel::ALL {
        let rows = store.attribution_rows(model, june_end()).unwrap();
        assert_eq!(rows.len(), 3, "{model} set was not persisted");
    }
}

#[test]
fn reports_serialize_with_snake_case_ids() {
    let engine = AttributionEngine::new(seeded_store(), EngineConfig::default());
    let report = engine
        .calculate_attribution("2025-06-01", "2025-06-30", "u_shaped")
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["model"], "u_shaped");
    assert!(json["results"][0]["attributed_conversions"].is_u64());
    assert!(json["summary"]["total_attributed_revenue"].is_number());
}

#[test]
fn bad_inputs_come_back_as_errors_not_panics() {
    let engine = AttributionEngine::new(seeded_store(), EngineConfig::default());
    assert!(engine
        .calculate_attribution("not-a-date", "2025-06-30", "linear")
        .is_err());
    assert!(engine
        .calculate_attribution("2025-06-01", "2025-06-30", "shapley")
        .is_err());
    assert!(engine
        .calculate_attribution("2025-06-30", "2025-06-01", "linear")
        .is_err());
}
