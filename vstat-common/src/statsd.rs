use vstat_statsd::{CounterMetric, GaugeMetric, TimerMetric};

/// Counter metrics for pulls and aggregation guardrails.
pub enum GuardrailCounters {
    /// Incremented for every pull request, whether it is served from the cache or not.
    ///
    /// This metric is tagged with:
    ///  - `tag`: The data source tag.
    PullRequested,
    /// Incremented for every pull served from the cache within the cooldown.
    ///
    /// This metric is tagged with:
    ///  - `tag`: The data source tag.
    PullCacheHit,
    /// Incremented for every pull that failed or was refused after a recent failure.
    ///
    /// This metric is tagged with:
    ///  - `tag`: The data source tag.
    PullFailed,
    /// Incremented for every sample dropped because its metric reached the hard dimension limit.
    ///
    /// This metric is tagged with:
    ///  - `metric`: The metric id.
    DimensionRejected,
    /// Incremented for every sample or trigger older than the current bucket.
    ///
    /// This metric is tagged with:
    ///  - `metric`: The metric id.
    LateEvent,
    /// Incremented when a diff could not be computed because a counter went backwards.
    ///
    /// This metric is tagged with:
    ///  - `metric`: The metric id.
    PullDataError,
    /// Incremented when a successful pull delivered no samples.
    ///
    /// This metric is tagged with:
    ///  - `metric`: The metric id.
    EmptyData,
    /// Incremented when a metric had to skip forward over whole buckets.
    ///
    /// This metric is tagged with:
    ///  - `metric`: The metric id.
    SkippedForwardBuckets,
}

impl CounterMetric for GuardrailCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::PullRequested => "pull.requested",
            Self::PullCacheHit => "pull.cache_hit",
            Self::PullFailed => "pull.failed",
            Self::DimensionRejected => "metrics.dimension.rejected",
            Self::LateEvent => "metrics.late_event",
            Self::PullDataError => "metrics.pull_data_error",
            Self::EmptyData => "metrics.empty_data",
            Self::SkippedForwardBuckets => "metrics.buckets.skipped_forward",
        }
    }
}

/// Timer metrics for pulls.
pub enum GuardrailTimers {
    /// Time between the pull request and the moment the cached samples were produced.
    ///
    /// Only recorded for cache hits. This metric is tagged with:
    ///  - `tag`: The data source tag.
    PullDelay,
    /// Time spent in the data source fetching fresh samples.
    ///
    /// This metric is tagged with:
    ///  - `tag`: The data source tag.
    PullTime,
}

impl TimerMetric for GuardrailTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::PullDelay => "pull.delay",
            Self::PullTime => "pull.duration",
        }
    }
}

/// Gauge metrics for pulls and aggregation guardrails.
pub enum GuardrailGauges {
    /// The smallest interval in milliseconds observed between two fresh pulls of a tag.
    ///
    /// This metric is tagged with:
    ///  - `tag`: The data source tag.
    MinPullInterval,
    /// The number of dimensions a metric tracks once it passed its soft limit.
    ///
    /// This metric is tagged with:
    ///  - `metric`: The metric id.
    DimensionSize,
}

impl GaugeMetric for GuardrailGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::MinPullInterval => "pull.min_interval",
            Self::DimensionSize => "metrics.dimension.size",
        }
    }
}
