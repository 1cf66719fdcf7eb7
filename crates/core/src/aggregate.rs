//! Window aggregation over daily channel rows.

use std::collections::BTreeMap;

use crate::types::{ChannelData, ChannelMetricRecord, ChannelTotals, Period};

/// Sum rows by channel. Output is ordered by channel name, which keeps
/// every downstream report deterministic.
pub fn by_channel(records: &[ChannelMetricRecord]) -> BTreeMap<String, ChannelTotals> {
    let mut totals: BTreeMap<String, ChannelTotals> = BTreeMap::new();
    for record in records {
        totals
            .entry(record.channel.clone())
            .or_default()
            .accumulate(record);
    }
    totals
}

/// Sum rows by channel, restricted to `period`.
pub fn by_channel_in(
    records: &[ChannelMetricRecord],
    period: Period,
) -> BTreeMap<String, ChannelTotals> {
    let mut totals: BTreeMap<String, ChannelTotals> = BTreeMap::new();
    for record in records {
        if period.contains(record.date) {
            totals
                .entry(record.channel.clone())
                .or_default()
                .accumulate(record);
        }
    }
    totals
}

/// Sum rows into a presence-tagged total. `Absent` when there are no
/// rows at all, which callers must distinguish from rows summing to
/// zero.
pub fn presence(records: &[ChannelMetricRecord]) -> ChannelData {
    if records.is_empty() {
        return ChannelData::Absent;
    }
    let mut totals = ChannelTotals::default();
    for record in records {
        totals.accumulate(record);
    }
    ChannelData::Present(totals)
}
