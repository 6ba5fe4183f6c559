use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use vstat_statsd::metric;

use crate::statsd::{GuardrailCounters, GuardrailGauges, GuardrailTimers};
use crate::{MetricId, TagId};

/// Sink for health statistics of pulls and metrics.
///
/// Implementations are shared between all caches and engines of a process and must therefore be
/// safe to call concurrently. All methods default to doing nothing.
#[allow(unused_variables)]
pub trait GuardrailStats: Send + Sync {
    /// A pull was requested for `tag`.
    fn note_pull(&self, tag: TagId) {}

    /// A pull for `tag` was served from the cache.
    fn note_pull_from_cache(&self, tag: TagId) {}

    /// A successful pull for `tag` was served `delay` after its requested timestamp.
    ///
    /// Recorded for cache hits and fresh fetches alike.
    fn note_pull_delay(&self, tag: TagId, delay: Duration) {}

    /// The data source for `tag` successfully fetched in `duration`.
    fn note_pull_time(&self, tag: TagId, duration: Duration) {}

    /// A pull for `tag` failed.
    fn note_pull_failed(&self, tag: TagId) {}

    /// The smallest interval between two fresh pulls of `tag` shrank to `interval`.
    fn update_min_pull_interval(&self, tag: TagId, interval: Duration) {}

    /// The metric tracks `size` dimensions, which is beyond its soft limit.
    fn note_dimension_size(&self, metric: MetricId, size: usize) {}

    /// The metric dropped a sample because it reached its hard dimension limit.
    fn note_dimension_rejected(&self, metric: MetricId) {}

    /// The metric dropped a sample or trigger older than its current bucket.
    fn note_late_event(&self, metric: MetricId) {}

    /// The metric saw a value going in the wrong direction and rebased.
    fn note_pull_data_error(&self, metric: MetricId) {}

    /// The metric received a successful pull without any samples.
    fn note_empty_data(&self, metric: MetricId) {}

    /// The metric skipped forward over at least one whole bucket.
    fn note_skipped_forward_buckets(&self, metric: MetricId) {}
}

/// Discards all statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopGuardrailStats;

impl GuardrailStats for NoopGuardrailStats {}

/// Forwards all statistics to the global statsd client.
///
/// Without a configured client, this behaves like [`NoopGuardrailStats`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsdGuardrailStats;

impl GuardrailStats for StatsdGuardrailStats {
    fn note_pull(&self, tag: TagId) {
        metric!(
            counter(GuardrailCounters::PullRequested) += 1,
            tag = &tag.to_string()
        );
    }

    fn note_pull_from_cache(&self, tag: TagId) {
        metric!(
            counter(GuardrailCounters::PullCacheHit) += 1,
            tag = &tag.to_string()
        );
    }

    fn note_pull_delay(&self, tag: TagId, delay: Duration) {
        metric!(
            timer(GuardrailTimers::PullDelay) = delay,
            tag = &tag.to_string()
        );
    }

    fn note_pull_time(&self, tag: TagId, duration: Duration) {
        metric!(
            timer(GuardrailTimers::PullTime) = duration,
            tag = &tag.to_string()
        );
    }

    fn note_pull_failed(&self, tag: TagId) {
        metric!(
            counter(GuardrailCounters::PullFailed) += 1,
            tag = &tag.to_string()
        );
    }

    fn update_min_pull_interval(&self, tag: TagId, interval: Duration) {
        metric!(
            gauge(GuardrailGauges::MinPullInterval) = interval.as_millis() as u64,
            tag = &tag.to_string()
        );
    }

    fn note_dimension_size(&self, metric: MetricId, size: usize) {
        metric!(
            gauge(GuardrailGauges::DimensionSize) = size as u64,
            metric = &metric.to_string()
        );
    }

    fn note_dimension_rejected(&self, metric: MetricId) {
        metric!(
            counter(GuardrailCounters::DimensionRejected) += 1,
            metric = &metric.to_string()
        );
    }

    fn note_late_event(&self, metric: MetricId) {
        metric!(
            counter(GuardrailCounters::LateEvent) += 1,
            metric = &metric.to_string()
        );
    }

    fn note_pull_data_error(&self, metric: MetricId) {
        metric!(
            counter(GuardrailCounters::PullDataError) += 1,
            metric = &metric.to_string()
        );
    }

    fn note_empty_data(&self, metric: MetricId) {
        metric!(
            counter(GuardrailCounters::EmptyData) += 1,
            metric = &metric.to_string()
        );
    }

    fn note_skipped_forward_buckets(&self, metric: MetricId) {
        metric!(
            counter(GuardrailCounters::SkippedForwardBuckets) += 1,
            metric = &metric.to_string()
        );
    }
}

/// Pull statistics of a single tag collected by the [`GuardrailRecorder`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullStats {
    /// Number of requested pulls.
    pub pulls: u64,
    /// Number of pulls served from the cache.
    pub cache_hits: u64,
    /// Number of failed pulls.
    pub failures: u64,
    /// Number of successful fetches from the data source.
    pub fetches: u64,
    /// The largest delay between the requested timestamp of a pull and serving it.
    pub max_pull_delay: Duration,
    /// The smallest interval between two fresh pulls.
    pub min_pull_interval: Option<Duration>,
}

/// Statistics of a single metric collected by the [`GuardrailRecorder`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricStats {
    /// The largest dimension count reported beyond the soft limit.
    pub max_dimension_size: usize,
    /// Number of samples rejected by the hard dimension limit.
    pub dimension_rejected: u64,
    /// Number of late samples and triggers.
    pub late_events: u64,
    /// Number of values that went in the wrong direction.
    pub pull_data_errors: u64,
    /// Number of successful pulls without samples.
    pub empty_data: u64,
    /// Number of times the metric skipped forward over whole buckets.
    pub skipped_forward_buckets: u64,
}

#[derive(Debug, Default)]
struct Recorded {
    pulls: HashMap<TagId, PullStats>,
    metrics: HashMap<MetricId, MetricStats>,
}

/// Records all statistics in memory.
///
/// Used in tests and by embedders that report health through their own channels.
#[derive(Debug, Default)]
pub struct GuardrailRecorder {
    inner: Mutex<Recorded>,
}

impl GuardrailRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the statistics recorded for `tag`.
    pub fn pull_stats(&self, tag: TagId) -> PullStats {
        self.inner.lock().pulls.get(&tag).cloned().unwrap_or_default()
    }

    /// Returns the statistics recorded for `metric`.
    pub fn metric_stats(&self, metric: MetricId) -> MetricStats {
        self.inner
            .lock()
            .metrics
            .get(&metric)
            .cloned()
            .unwrap_or_default()
    }

    /// Discards everything recorded so far.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.pulls.clear();
        inner.metrics.clear();
    }

    fn with_pull(&self, tag: TagId, f: impl FnOnce(&mut PullStats)) {
        f(self.inner.lock().pulls.entry(tag).or_default());
    }

    fn with_metric(&self, metric: MetricId, f: impl FnOnce(&mut MetricStats)) {
        f(self.inner.lock().metrics.entry(metric).or_default());
    }
}

impl GuardrailStats for GuardrailRecorder {
    fn note_pull(&self, tag: TagId) {
        self.with_pull(tag, |s| s.pulls += 1);
    }

    fn note_pull_from_cache(&self, tag: TagId) {
        self.with_pull(tag, |s| s.cache_hits += 1);
    }

    fn note_pull_delay(&self, tag: TagId, delay: Duration) {
        self.with_pull(tag, |s| s.max_pull_delay = s.max_pull_delay.max(delay));
    }

    fn note_pull_time(&self, tag: TagId, _duration: Duration) {
        self.with_pull(tag, |s| s.fetches += 1);
    }

    fn note_pull_failed(&self, tag: TagId) {
        self.with_pull(tag, |s| s.failures += 1);
    }

    fn update_min_pull_interval(&self, tag: TagId, interval: Duration) {
        self.with_pull(tag, |s| {
            s.min_pull_interval = Some(s.min_pull_interval.map_or(interval, |m| m.min(interval)));
        });
    }

    fn note_dimension_size(&self, metric: MetricId, size: usize) {
        self.with_metric(metric, |s| {
            s.max_dimension_size = s.max_dimension_size.max(size)
        });
    }

    fn note_dimension_rejected(&self, metric: MetricId) {
        self.with_metric(metric, |s| s.dimension_rejected += 1);
    }

    fn note_late_event(&self, metric: MetricId) {
        self.with_metric(metric, |s| s.late_events += 1);
    }

    fn note_pull_data_error(&self, metric: MetricId) {
        self.with_metric(metric, |s| s.pull_data_errors += 1);
    }

    fn note_empty_data(&self, metric: MetricId) {
        self.with_metric(metric, |s| s.empty_data += 1);
    }

    fn note_skipped_forward_buckets(&self, metric: MetricId) {
        self.with_metric(metric, |s| s.skipped_forward_buckets += 1);
    }
}

#[cfg(test)]
mod tests {
    use vstat_statsd::with_capturing_test_client;

    use super::*;

    #[test]
    fn test_recorder_pull_stats() {
        let recorder = GuardrailRecorder::new();
        recorder.note_pull(10_000);
        recorder.note_pull(10_000);
        recorder.note_pull_from_cache(10_000);
        recorder.note_pull_delay(10_000, Duration::from_millis(3));
        recorder.note_pull_delay(10_000, Duration::from_millis(1));
        recorder.note_pull_time(10_000, Duration::from_millis(9));
        recorder.update_min_pull_interval(10_000, Duration::from_secs(5));
        recorder.update_min_pull_interval(10_000, Duration::from_secs(7));

        similar_asserts::assert_eq!(
            recorder.pull_stats(10_000),
            PullStats {
                pulls: 2,
                cache_hits: 1,
                failures: 0,
                fetches: 1,
                max_pull_delay: Duration::from_millis(3),
                min_pull_interval: Some(Duration::from_secs(5)),
            }
        );
        assert_eq!(recorder.pull_stats(10_001), PullStats::default());
    }

    #[test]
    fn test_recorder_metric_stats() {
        let recorder = GuardrailRecorder::new();
        recorder.note_dimension_size(42, 501);
        recorder.note_dimension_size(42, 500);
        recorder.note_dimension_rejected(42);
        recorder.note_late_event(42);
        recorder.note_pull_data_error(42);

        let stats = recorder.metric_stats(42);
        assert_eq!(stats.max_dimension_size, 501);
        assert_eq!(stats.dimension_rejected, 1);
        assert_eq!(stats.late_events, 1);
        assert_eq!(stats.pull_data_errors, 1);

        recorder.reset();
        assert_eq!(recorder.metric_stats(42), MetricStats::default());
    }

    #[test]
    fn test_statsd_stats() {
        let captures = with_capturing_test_client(|| {
            StatsdGuardrailStats.note_pull_from_cache(10_000);
            StatsdGuardrailStats.note_dimension_rejected(7);
            StatsdGuardrailStats.update_min_pull_interval(10_000, Duration::from_millis(1500));
        });

        similar_asserts::assert_eq!(
            captures,
            vec![
                "pull.cache_hit:1|c|#tag:10000",
                "metrics.dimension.rejected:1|c|#metric:7",
                "pull.min_interval:1500|g|#tag:10000",
            ]
        );
    }
}
