use serde::Serialize;
use vstat_common::{DimensionKey, ElapsedTimestamp, MetricId, Value};

/// The aggregate of one value field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IndexedValue {
    /// 0-based index into the metric's value fields.
    pub index: usize,
    /// The aggregated value.
    pub value: Value,
}

/// A finalized bucket of one dimension.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValueBucket {
    /// Start of the bucket on the elapsed clock.
    pub start: ElapsedTimestamp,
    /// End of the bucket on the elapsed clock, exclusive.
    pub end: ElapsedTimestamp,
    /// Aggregates ordered by value index. Value fields without data are left out.
    pub values: Vec<IndexedValue>,
}

impl ValueBucket {
    /// Estimates the number of bytes held by this bucket.
    pub fn cost(&self) -> usize {
        std::mem::size_of::<Self>() + self.values.len() * std::mem::size_of::<IndexedValue>()
    }
}

/// A span of time for which no buckets were reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedSpan {
    /// Start of the span on the elapsed clock.
    pub start: ElapsedTimestamp,
    /// End of the span on the elapsed clock, exclusive.
    pub end: ElapsedTimestamp,
}

/// All buckets of one dimension.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimensionData {
    /// The dimension.
    pub key: DimensionKey,
    /// Buckets in chronological order.
    pub buckets: Vec<ValueBucket>,
}

/// The drained history of a metric.
///
/// Dimensions are ordered by their key, so that output is stable across dumps.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValueMetricReport {
    /// The reported metric.
    pub metric_id: MetricId,
    /// Buckets per dimension.
    pub dimensions: Vec<DimensionData>,
    /// Spans without reported buckets, in chronological order.
    pub skipped: Vec<SkippedSpan>,
}

impl ValueMetricReport {
    /// Returns `true` if the report contains neither buckets nor skipped spans.
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.skipped.is_empty()
    }

    /// Returns the buckets of dimension `key`.
    pub fn buckets(&self, key: &DimensionKey) -> &[ValueBucket] {
        self.dimensions
            .iter()
            .find(|d| &d.key == key)
            .map_or(&[], |d| d.buckets.as_slice())
    }
}
