use vstat_statsd::{CounterMetric, TimerMetric};

/// Counter metrics for value metrics.
pub enum MetricCounters {
    /// Incremented for every bucket closed by a metric.
    ///
    /// This metric is tagged with:
    ///  - `outcome`: `reported`, `too_short` or `condition_false`.
    BucketClosed,
    /// Number of finalized buckets discarded without being reported.
    BucketsDropped,
}

impl CounterMetric for MetricCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::BucketClosed => "metrics.bucket.closed",
            Self::BucketsDropped => "metrics.buckets.dropped",
        }
    }
}

/// Timer metrics for value metrics.
pub enum MetricTimers {
    /// Time spent building a report, including the pull for a partial bucket.
    DumpReport,
}

impl TimerMetric for MetricTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::DumpReport => "metrics.report.duration",
        }
    }
}
