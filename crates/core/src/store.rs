//! Historical data access shared by the engine crates.

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::debug;

use crate::error::MmmResult;
use crate::types::{AttributionModel, ChannelMetricRecord, Period, StoredAttribution};

/// Read/write access to daily channel history and persisted attribution
/// sets.
///
/// `replace_attribution` must be atomic per `(model, period end)` key:
/// concurrent writers may interleave freely, but a reader never observes
/// a partially replaced set. All read methods return rows in a fixed
/// order so downstream output is deterministic regardless of backing
/// storage.
pub trait HistoricalStore: Send + Sync {
    /// All rows within `period`, ordered by `(date, channel)`.
    fn records_in(&self, period: Period) -> MmmResult<Vec<ChannelMetricRecord>>;

    /// Rows for one channel within `period`, date ascending.
    fn channel_records(
        &self,
        channel: &str,
        period: Period,
    ) -> MmmResult<Vec<ChannelMetricRecord>>;

    /// Total revenue across all channels within `period`.
    fn revenue_in(&self, period: Period) -> MmmResult<f64>;

    /// Atomically replace the stored attribution set for `(model, end)`.
    fn replace_attribution(
        &self,
        model: AttributionModel,
        end: NaiveDate,
        rows: Vec<StoredAttribution>,
    ) -> MmmResult<()>;

    /// Stored attribution rows for `(model, end)`, channel ascending.
    fn attribution_rows(
        &self,
        model: AttributionModel,
        end: NaiveDate,
    ) -> MmmResult<Vec<StoredAttribution>>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Concurrent in-memory store backed by `DashMap`. Suitable for tests
/// and single-node deployments; durable backends implement the same
/// trait.
pub struct MemoryStore {
    /// (date, channel) -> daily row
    records: DashMap<(NaiveDate, String), ChannelMetricRecord>,
    /// (model, period end) -> attribution set
    attributions: DashMap<(AttributionModel, NaiveDate), Vec<StoredAttribution>>,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            attributions: DashMap::new(),
        }
    }

    /// Insert or replace one daily row. The `(date, channel)` pair is
    /// the row identity, so re-ingesting a day is idempotent.
    pub fn upsert_record(&self, record: ChannelMetricRecord) {
        self.records
            .insert((record.date, record.channel.clone()), record);
    }

    pub fn upsert_records(&self, records: impl IntoIterator<Item = ChannelMetricRecord>) {
        for record in records {
            self.upsert_record(record);
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoricalStore for MemoryStore {
    fn records_in(&self, period: Period) -> MmmResult<Vec<ChannelMetricRecord>> {
        let mut rows: Vec<ChannelMetricRecord> = self
            .records
            .iter()
            .filter(|entry| period.contains(entry.value().date))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| (a.date, &a.channel).cmp(&(b.date, &b.channel)));
        Ok(rows)
    }

    fn channel_records(
        &self,
        channel: &str,
        period: Period,
    ) -> MmmResult<Vec<ChannelMetricRecord>> {
        let mut rows: Vec<ChannelMetricRecord> = self
            .records
            .iter()
            .filter(|entry| {
                let row = entry.value();
                row.channel == channel && period.contains(row.date)
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.date);
        Ok(rows)
    }

    fn revenue_in(&self, period: Period) -> MmmResult<f64> {
        Ok(self
            .records
            .iter()
            .filter(|entry| period.contains(entry.value().date))
            .map(|entry| entry.value().revenue)
            .sum())
    }

    fn replace_attribution(
        &self,
        model: AttributionModel,
        end: NaiveDate,
        rows: Vec<StoredAttribution>,
    ) -> MmmResult<()> {
        debug!(model = %model, %end, rows = rows.len(), "replacing attribution set");
        self.attributions.insert((model, end), rows);
        Ok(())
    }

    fn attribution_rows(
        &self,
        model: AttributionModel,
        end: NaiveDate,
    ) -> MmmResult<Vec<StoredAttribution>> {
        let mut rows = self
            .attributions
            .get(&(model, end))
            .map(|r| r.value().clone())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.channel.cmp(&b.channel));
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
