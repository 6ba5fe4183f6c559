//! Bucketed aggregation of value metrics.
//!
//! A value metric reduces the numeric fields of matching samples into fixed-size time buckets,
//! sliced by a set of dimension fields. Samples arrive in two ways:
//!
//!  - **Pushed** samples are delivered as they happen through [`SampleReceiver::on_samples`].
//!  - **Pulled** samples are snapshots of monotonic counters, requested from a
//!    [`Puller`](vstat_pull::Puller) at bucket boundaries, when the condition changes, and before
//!    partial buckets are closed. The [`PullManager`](vstat_pull::PullManager) delivers scheduled
//!    snapshots to the [`AggregationEngine`] as a [`PullDataReceiver`](vstat_pull::PullDataReceiver).
//!
//! # Diffing
//!
//! Pulled metrics report the change of a counter rather than its absolute value. For each dimension
//! and value field, the engine keeps the last seen value as a base and aggregates the difference to
//! the next value. The first value of a dimension only establishes the base. When a counter moves in
//! the unexpected direction, for example after a reboot, the value either counts as the diff or
//! becomes the new base, depending on [`ValueMetricConfig::use_absolute_value_on_reset`].
//!
//! # Buckets
//!
//! Buckets are aligned to multiples of [`ValueMetricConfig::bucket_size_ms`] since a time base.
//! Upgrades split the current bucket into partial buckets, which are reported separately. Buckets
//! shorter than [`ValueMetricConfig::min_bucket_size_ms`], or during which the condition never held,
//! are reported as [`SkippedSpan`]s instead.
//!
//! # Guardrails
//!
//! Every metric limits the number of dimensions it tracks per bucket. Beyond the soft limit, the
//! engine warns and reports the dimension count. New dimensions beyond the hard limit are dropped.

#![warn(missing_docs)]

mod config;
mod engine;
mod hooks;
mod listener;
mod report;
mod statsd;

pub use self::config::*;
pub use self::engine::*;
pub use self::hooks::*;
pub use self::listener::*;
pub use self::report::*;
