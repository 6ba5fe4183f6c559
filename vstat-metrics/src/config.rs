use std::time::Duration;

use serde::{Deserialize, Serialize};
use vstat_common::{ConditionId, MatcherId, MetricId, TagId};

/// How the values of one bucket are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Adds up all values.
    #[default]
    Sum,
    /// Keeps the smallest value.
    Min,
    /// Keeps the largest value.
    Max,
    /// Reports the sum divided by the number of values.
    Avg,
}

/// The expected direction of diffed values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueDirection {
    /// Values only grow. A smaller value means the counter was reset.
    #[default]
    Increasing,
    /// Values only shrink. A larger value means the counter was reset.
    Decreasing,
    /// Values move freely, diffs are signed.
    Any,
}

/// An error returned when a [`ValueMetricConfig`] cannot be used.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The bucket size is zero.
    #[error("bucket size must not be zero")]
    ZeroBucketSize,
    /// No value fields are configured.
    #[error("metric has no value fields")]
    NoValueFields,
    /// A field position is zero, positions are 1-based.
    #[error("field positions are 1-based, got 0")]
    InvalidFieldPosition,
    /// The soft dimension limit is above the hard limit.
    #[error("soft dimension limit {soft} exceeds hard limit {hard}")]
    SoftLimitAboveHardLimit {
        /// The configured soft limit.
        soft: usize,
        /// The configured hard limit.
        hard: usize,
    },
    /// The metric is pulled but no puller was provided.
    #[error("pulled metric for tag {0} has no puller")]
    MissingPuller(TagId),
}

/// Definition of a value metric.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ValueMetricConfig {
    /// Identifier of the metric.
    pub id: MetricId,

    /// Matcher deciding which samples belong to this metric.
    pub what: MatcherId,

    /// Condition gating the metric.
    ///
    /// Defaults to `None`, in which case the condition is always true.
    pub condition: Option<ConditionId>,

    /// Evaluates the condition for every pushed sample instead of using the overall condition.
    ///
    /// Defaults to `false`.
    pub condition_sliced: bool,

    /// The tag to pull samples of.
    ///
    /// Defaults to `None`, which makes this a pushed metric.
    pub pull_tag: Option<TagId>,

    /// 1-based positions of the fields samples are sliced by.
    ///
    /// Defaults to an empty list, which aggregates all samples into one dimension.
    pub dimensions: Vec<usize>,

    /// 1-based positions of the aggregated fields.
    pub values: Vec<usize>,

    /// How values in one bucket are combined.
    ///
    /// Defaults to [`Aggregation::Sum`].
    pub aggregation: Aggregation,

    /// Aggregates the difference to the previous value instead of the value itself.
    ///
    /// Defaults to `true` for pulled metrics and `false` for pushed metrics.
    pub use_diff: Option<bool>,

    /// The expected direction of diffed values.
    ///
    /// Defaults to [`ValueDirection::Increasing`].
    pub value_direction: ValueDirection,

    /// Omits dimensions from a bucket when their diff is exactly zero.
    ///
    /// Defaults to `true`.
    pub skip_zero_diff_output: bool,

    /// Diffs dimensions that are new in a pull against zero instead of waiting for a second value.
    ///
    /// Only applies once a pull established the global base. Defaults to `false`.
    pub use_zero_default_base: bool,

    /// Reports the raw value when a counter was reset instead of rebasing.
    ///
    /// Defaults to `false`.
    pub use_absolute_value_on_reset: bool,

    /// The size of a bucket in milliseconds.
    ///
    /// Defaults to 1 hour.
    pub bucket_size_ms: u64,

    /// Buckets shorter than this many milliseconds are skipped instead of reported.
    ///
    /// Defaults to `0`, so that every bucket is reported.
    pub min_bucket_size_ms: u64,

    /// Number of dimensions after which a warning is logged.
    ///
    /// Defaults to `500`.
    pub dimension_soft_limit: usize,

    /// Number of dimensions after which samples of new dimensions are dropped.
    ///
    /// Defaults to `800`.
    pub dimension_hard_limit: usize,
}

impl Default for ValueMetricConfig {
    fn default() -> Self {
        Self {
            id: 0,
            what: 0,
            condition: None,
            condition_sliced: false,
            pull_tag: None,
            dimensions: Vec::new(),
            values: Vec::new(),
            aggregation: Aggregation::default(),
            use_diff: None,
            value_direction: ValueDirection::default(),
            skip_zero_diff_output: true,
            use_zero_default_base: false,
            use_absolute_value_on_reset: false,
            bucket_size_ms: 60 * 60 * 1000, // 1 hour
            min_bucket_size_ms: 0,
            dimension_soft_limit: 500,
            dimension_hard_limit: 800,
        }
    }
}

impl ValueMetricConfig {
    /// Returns `true` if samples are pulled rather than pushed.
    pub fn is_pulled(&self) -> bool {
        self.pull_tag.is_some()
    }

    /// Returns `true` if diffs are aggregated instead of raw values.
    pub fn use_diff(&self) -> bool {
        self.use_diff.unwrap_or_else(|| self.is_pulled())
    }

    /// Returns the bucket size.
    pub fn bucket_size(&self) -> Duration {
        Duration::from_millis(self.bucket_size_ms)
    }

    /// Returns the minimum size of a reported bucket.
    pub fn min_bucket_size(&self) -> Duration {
        Duration::from_millis(self.min_bucket_size_ms)
    }

    /// Checks that the config describes a usable metric.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_size_ms == 0 {
            return Err(ConfigError::ZeroBucketSize);
        }

        if self.values.is_empty() {
            return Err(ConfigError::NoValueFields);
        }

        if self.values.iter().chain(&self.dimensions).any(|&p| p == 0) {
            return Err(ConfigError::InvalidFieldPosition);
        }

        if self.dimension_soft_limit > self.dimension_hard_limit {
            return Err(ConfigError::SoftLimitAboveHardLimit {
                soft: self.dimension_soft_limit,
                hard: self.dimension_hard_limit,
            });
        }

        Ok(())
    }
}
