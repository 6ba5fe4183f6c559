use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use smallvec::SmallVec;
use vstat_common::{
    DimensionKey, ElapsedTimestamp, GuardrailStats, MetricId, Sample, StatsdGuardrailStats, Value,
};
use vstat_pull::{PullDataReceiver, PullError, Puller};
use vstat_statsd::metric;

use self::interval::{Diff, DiffPolicy, Interval};
use crate::statsd::{MetricCounters, MetricTimers};
use crate::{
    AnomalyHook, ConditionEvaluator, ConfigError, DimensionData, EventMatcher, IndexedValue,
    LifecycleListener, MatchAll, NoopAnomalyHook, SampleReceiver, SkippedSpan, UnknownConditions,
    ValueBucket, ValueMetricConfig, ValueMetricReport,
};

mod interval;

/// External collaborators of an [`AggregationEngine`].
pub struct Collaborators {
    /// Decides which samples belong to the metric.
    pub matcher: Arc<dyn EventMatcher>,
    /// Evaluates sliced conditions.
    pub conditions: Arc<dyn ConditionEvaluator>,
    /// Pulls samples of the metric's tag. Required for pulled metrics.
    pub puller: Option<Arc<dyn Puller>>,
    /// Receives aggregates for alerting.
    pub anomaly: Arc<dyn AnomalyHook>,
    /// Receives guardrail statistics.
    pub stats: Arc<dyn GuardrailStats>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            matcher: Arc::new(MatchAll),
            conditions: Arc::new(UnknownConditions),
            puller: None,
            anomaly: Arc::new(NoopAnomalyHook),
            stats: Arc::new(StatsdGuardrailStats),
        }
    }
}

/// Aggregation state of one dimension in the current bucket.
#[derive(Debug)]
struct DimensionState {
    /// One interval per value field.
    intervals: SmallVec<[Interval; 2]>,
    /// Set when the dimension is part of the pull currently being processed.
    seen_in_pull: bool,
}

impl DimensionState {
    fn new(value_count: usize) -> Self {
        Self {
            intervals: smallvec::smallvec![Interval::default(); value_count],
            seen_in_pull: false,
        }
    }

    fn has_base(&self) -> bool {
        self.intervals.iter().any(|i| i.base.is_some())
    }
}

/// Critical section of the [`AggregationEngine`].
#[derive(Debug)]
struct EngineState {
    /// The overall condition.
    condition: bool,
    /// Whether the condition held at any point during the current bucket.
    condition_true_in_bucket: bool,
    /// Start of the current, possibly partial, bucket.
    bucket_start: ElapsedTimestamp,
    /// Number of the current full bucket since the time base.
    bucket_num: u64,
    /// Set by every processed pull, cleared whenever all bases are invalidated.
    has_global_base: bool,
    /// Live dimensions of the current bucket.
    sliced: HashMap<DimensionKey, DimensionState>,
    /// Dimensions turned away by the hard limit in the current bucket.
    rejected: HashSet<DimensionKey>,
    /// Values of earlier partial buckets of the current full bucket, for anomaly detection.
    full_bucket: HashMap<DimensionKey, Value>,
    /// Finalized buckets waiting for the next report.
    past: BTreeMap<DimensionKey, Vec<ValueBucket>>,
    /// Spans without buckets waiting for the next report.
    skipped: Vec<SkippedSpan>,
    soft_limit_warned: bool,
    hard_limit_warned: bool,
}

/// Aggregates the samples of one value metric into time buckets.
///
/// Samples are sliced by their dimension key. Every dimension tracks one interval per value
/// field, which holds the base to diff against and the aggregate of the current bucket. Buckets are
/// aligned to multiples of the bucket size since the time base. A bucket can be split into partial
/// buckets by upgrades, each of which is reported separately.
///
/// All operations run synchronously under one lock on the calling thread. Pulls for pulled metrics
/// are issued while holding that lock.
pub struct AggregationEngine {
    config: ValueMetricConfig,
    time_base: ElapsedTimestamp,
    bucket_nanos: u64,
    use_diff: bool,
    diff_policy: DiffPolicy,
    context: Collaborators,
    state: Mutex<EngineState>,
}

impl AggregationEngine {
    /// Creates an engine whose first, partial bucket starts at `start`.
    ///
    /// Pulled diff metrics without a condition pull immediately to establish their base.
    pub fn new(
        config: ValueMetricConfig,
        time_base: ElapsedTimestamp,
        start: ElapsedTimestamp,
        context: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if let Some(tag) = config.pull_tag {
            if context.puller.is_none() {
                return Err(ConfigError::MissingPuller(tag));
            }
        }

        let bucket_nanos = config.bucket_size_ms.saturating_mul(1_000_000);
        let bucket_num = start.as_nanos().saturating_sub(time_base.as_nanos()) / bucket_nanos;
        let condition = config.condition.is_none();

        let engine = Self {
            time_base,
            bucket_nanos,
            use_diff: config.use_diff(),
            diff_policy: DiffPolicy {
                direction: config.value_direction,
                absolute_on_reset: config.use_absolute_value_on_reset,
                zero_default_base: config.use_zero_default_base,
            },
            context,
            state: Mutex::new(EngineState {
                condition,
                condition_true_in_bucket: condition,
                bucket_start: start,
                bucket_num,
                has_global_base: false,
                sliced: HashMap::new(),
                rejected: HashSet::new(),
                full_bucket: HashMap::new(),
                past: BTreeMap::new(),
                skipped: Vec::new(),
                soft_limit_warned: false,
                hard_limit_warned: false,
            }),
            config,
        };

        if engine.config.is_pulled() && engine.use_diff && condition {
            let mut state = engine.state.lock();
            engine.pull_and_accumulate(&mut state, start, start);
            drop(state);
        }

        Ok(engine)
    }

    /// Returns the id of the metric.
    pub fn id(&self) -> MetricId {
        self.config.id
    }

    /// Returns the definition of the metric.
    pub fn config(&self) -> &ValueMetricConfig {
        &self.config
    }

    /// Returns the start of the current, possibly partial, bucket.
    pub fn current_bucket_start(&self) -> ElapsedTimestamp {
        self.state.lock().bucket_start
    }

    /// Returns the end of the current full bucket.
    ///
    /// This is where the next scheduled pull of a pulled metric should happen.
    pub fn current_bucket_end(&self) -> ElapsedTimestamp {
        self.bucket_end(self.state.lock().bucket_num)
    }

    /// Returns the number of the current full bucket since the time base.
    pub fn current_bucket_num(&self) -> u64 {
        self.state.lock().bucket_num
    }

    /// Returns the overall condition.
    pub fn condition(&self) -> bool {
        self.state.lock().condition
    }

    /// Returns the number of live dimensions.
    pub fn dimension_count(&self) -> usize {
        self.state.lock().sliced.len()
    }

    /// Closes all full buckets that ended before `timestamp`.
    pub fn flush_if_needed(&self, timestamp: ElapsedTimestamp) {
        let mut state = self.state.lock();
        self.flush_if_needed_locked(&mut state, timestamp);
    }

    /// Closes the current bucket at `timestamp` and starts a new partial bucket there.
    ///
    /// Pulled metrics with a true condition pull right before the split, so that both partial
    /// buckets get the data they are due.
    pub fn flush_partial_bucket(&self, timestamp: ElapsedTimestamp) {
        let mut state = self.state.lock();
        if timestamp < state.bucket_start {
            self.note_late(&mut state, timestamp, "partial bucket flush");
            return;
        }

        if self.config.is_pulled() && state.condition {
            self.pull_before(&mut state, timestamp);
        }

        self.flush_if_needed_locked(&mut state, timestamp);
        if timestamp > state.bucket_start {
            self.flush_current_locked(&mut state, timestamp, timestamp);
        }
    }

    /// Invalidates the base of every dimension.
    ///
    /// The next value of every dimension only becomes its new base.
    pub fn reset_base(&self) {
        let mut state = self.state.lock();
        Self::reset_base_locked(&mut state);
    }

    /// Drops all finalized buckets without reporting them.
    pub fn drop_data(&self, timestamp: ElapsedTimestamp) {
        let mut state = self.state.lock();
        self.flush_if_needed_locked(&mut state, timestamp);

        let dropped = state.past.values().map(Vec::len).sum::<usize>();
        metric!(counter(MetricCounters::BucketsDropped) += dropped as i64);
        vstat_log::debug!(metric = self.config.id, dropped, "dropped finalized buckets");

        state.past.clear();
        state.skipped.clear();
    }

    /// Discards finalized buckets and skipped spans after they were reported elsewhere.
    pub fn clear_past_buckets(&self, timestamp: ElapsedTimestamp) {
        let mut state = self.state.lock();
        self.flush_if_needed_locked(&mut state, timestamp);
        state.past.clear();
        state.skipped.clear();
    }

    /// Drains the finalized buckets.
    ///
    /// Full buckets that ended before `timestamp` are closed first. With `include_partial`, the
    /// current bucket is added as a bucket ending at `timestamp` without closing it. A current
    /// bucket that would be skipped is left out of the report, and is only recorded as skipped
    /// once it actually closes. With `erase`, reported buckets are freed, otherwise they are
    /// reported again by the next dump.
    pub fn dump_report(
        &self,
        timestamp: ElapsedTimestamp,
        include_partial: bool,
        erase: bool,
    ) -> ValueMetricReport {
        metric!(timer(MetricTimers::DumpReport), {
            let mut state = self.state.lock();

            if include_partial && self.config.is_pulled() && state.condition {
                self.pull_before(&mut state, timestamp);
            }
            self.flush_if_needed_locked(&mut state, timestamp);

            let partial = match include_partial && timestamp > state.bucket_start {
                true => match self.close_bucket(&state, timestamp) {
                    ClosedBucket::Reported(buckets) => buckets,
                    ClosedBucket::Skipped(..) => Vec::new(),
                },
                false => Vec::new(),
            };

            let (mut past, skipped) = match erase {
                true => (
                    std::mem::take(&mut state.past),
                    std::mem::take(&mut state.skipped),
                ),
                false => (state.past.clone(), state.skipped.clone()),
            };

            for (key, bucket) in partial {
                past.entry(key).or_default().push(bucket);
            }

            ValueMetricReport {
                metric_id: self.config.id,
                dimensions: past
                    .into_iter()
                    .map(|(key, buckets)| DimensionData { key, buckets })
                    .collect(),
                skipped,
            }
        })
    }

    /// Estimates the number of bytes held by this engine.
    ///
    /// Covers finalized buckets, skipped spans, and the live dimensions of the current bucket.
    pub fn byte_size(&self) -> usize {
        let state = self.state.lock();

        let past = state
            .past
            .iter()
            .map(|(key, buckets)| key.cost() + buckets.iter().map(ValueBucket::cost).sum::<usize>())
            .sum::<usize>();

        let live = state
            .sliced
            .iter()
            .map(|(key, dimension)| {
                let spilled = match dimension.intervals.spilled() {
                    true => dimension.intervals.capacity() * std::mem::size_of::<Interval>(),
                    false => 0,
                };
                key.cost() + std::mem::size_of::<DimensionState>() + spilled
            })
            .sum::<usize>();

        past + live + state.skipped.len() * std::mem::size_of::<SkippedSpan>()
    }

    fn bucket_end(&self, bucket_num: u64) -> ElapsedTimestamp {
        let offset = self.bucket_nanos.saturating_mul(bucket_num.saturating_add(1));
        ElapsedTimestamp::from_nanos(self.time_base.as_nanos().saturating_add(offset))
    }

    /// Returns the end of the last full bucket that ended at or before `timestamp`.
    fn previous_bucket_end(&self, timestamp: ElapsedTimestamp) -> ElapsedTimestamp {
        let since_base = timestamp.as_nanos().saturating_sub(self.time_base.as_nanos());
        let aligned = since_base / self.bucket_nanos * self.bucket_nanos;
        ElapsedTimestamp::from_nanos(self.time_base.as_nanos() + aligned)
    }

    fn note_late(&self, state: &mut EngineState, timestamp: ElapsedTimestamp, what: &str) {
        vstat_log::debug!(
            metric = self.config.id,
            %timestamp,
            bucket_start = %state.bucket_start,
            "skipping late {what}"
        );
        self.context.stats.note_late_event(self.config.id);
    }

    fn reset_base_locked(state: &mut EngineState) {
        for dimension in state.sliced.values_mut() {
            for interval in &mut dimension.intervals {
                interval.base = None;
            }
        }
        state.has_global_base = false;
    }

    /// Pulls at `timestamp - 1` and attributes the samples to the bucket before `timestamp`.
    fn pull_before(&self, state: &mut EngineState, timestamp: ElapsedTimestamp) {
        let pull_time = timestamp.prev();
        self.flush_if_needed_locked(state, pull_time);
        let event_time = pull_time.max(state.bucket_start);
        self.pull_and_accumulate(state, pull_time, event_time);
    }

    fn pull_and_accumulate(
        &self,
        state: &mut EngineState,
        pull_time: ElapsedTimestamp,
        event_time: ElapsedTimestamp,
    ) {
        let Some(puller) = &self.context.puller else {
            return;
        };

        match puller.pull(pull_time) {
            Ok(samples) => self.accumulate_pulled(state, &samples, event_time),
            Err(error) => {
                vstat_log::debug!(
                    metric = self.config.id,
                    error = &error as &dyn Error,
                    "pull failed, invalidating bases"
                );
                Self::reset_base_locked(state);
            }
        }
    }

    /// Processes one pulled snapshot as if all samples happened at `event_time`.
    fn accumulate_pulled(
        &self,
        state: &mut EngineState,
        samples: &[Sample],
        event_time: ElapsedTimestamp,
    ) {
        if event_time < state.bucket_start {
            self.note_late(state, event_time, "pulled data");
            return;
        }

        if samples.is_empty() {
            self.context.stats.note_empty_data(self.config.id);
        }

        for dimension in state.sliced.values_mut() {
            dimension.seen_in_pull = false;
        }

        for sample in samples {
            if !self.context.matcher.matches(self.config.what, sample) {
                continue;
            }

            if let Some(key) = DimensionKey::from_sample(sample, &self.config.dimensions) {
                self.accumulate(state, key, sample, event_time);
            }
        }

        // Dimensions missing from the snapshot cannot be diffed against the next one.
        for dimension in state.sliced.values_mut() {
            if !dimension.seen_in_pull {
                for interval in &mut dimension.intervals {
                    interval.base = None;
                }
            }
        }

        state.has_global_base = true;
    }

    fn on_pushed_locked(&self, state: &mut EngineState, sample: &Sample) {
        if !self.context.matcher.matches(self.config.what, sample) {
            return;
        }

        let Some(key) = DimensionKey::from_sample(sample, &self.config.dimensions) else {
            vstat_log::trace!(metric = self.config.id, "sample is missing dimension fields");
            return;
        };

        let condition = match self.config.condition {
            Some(condition) if self.config.condition_sliced => {
                self.context.conditions.query(condition, &key).is_true()
            }
            _ => state.condition,
        };

        if !condition {
            return;
        }

        if sample.elapsed < state.bucket_start {
            self.note_late(state, sample.elapsed, "sample");
            return;
        }

        self.flush_if_needed_locked(state, sample.elapsed);
        state.condition_true_in_bucket = true;
        self.accumulate(state, key, sample, sample.elapsed);
    }

    /// Returns `true` if the new dimension `key` must be rejected.
    ///
    /// Every rejected dimension is counted once per bucket.
    fn hit_guardrail(&self, state: &mut EngineState, key: &DimensionKey) -> bool {
        let count = state.sliced.len() + 1;
        if count <= self.config.dimension_soft_limit {
            return false;
        }

        if !state.soft_limit_warned {
            state.soft_limit_warned = true;
            vstat_log::warn!(
                metric = self.config.id,
                count,
                limit = self.config.dimension_soft_limit,
                "metric exceeded its soft dimension limit"
            );
        }
        self.context.stats.note_dimension_size(self.config.id, count);

        if count > self.config.dimension_hard_limit {
            if !state.hard_limit_warned {
                state.hard_limit_warned = true;
                vstat_log::error!(
                    metric = self.config.id,
                    limit = self.config.dimension_hard_limit,
                    "metric reached its hard dimension limit, dropping new dimensions"
                );
            }
            if state.rejected.insert(key.clone()) {
                self.context.stats.note_dimension_rejected(self.config.id);
            }
            return true;
        }

        false
    }

    /// Feeds the value fields of `sample` into the intervals of `key`.
    fn accumulate(
        &self,
        state: &mut EngineState,
        key: DimensionKey,
        sample: &Sample,
        event_time: ElapsedTimestamp,
    ) {
        let values = self
            .config
            .values
            .iter()
            .map(|&position| sample.value_at(position))
            .collect::<Option<SmallVec<[Value; 2]>>>();

        let Some(values) = values else {
            vstat_log::debug!(
                metric = self.config.id,
                %event_time,
                "sample is missing numeric value fields"
            );
            return;
        };

        if !state.sliced.contains_key(&key) {
            if self.hit_guardrail(state, &key) {
                return;
            }
            state
                .sliced
                .insert(key.clone(), DimensionState::new(values.len()));
        }

        let Some(dimension) = state.sliced.get_mut(&key) else {
            return;
        };
        dimension.seen_in_pull = true;

        let mut complete = true;
        for (interval, value) in dimension.intervals.iter_mut().zip(values) {
            let value = match self.use_diff {
                true => match interval.diff(value, self.diff_policy, state.has_global_base) {
                    Diff::Value(diff) => diff,
                    Diff::FirstBase => {
                        complete = false;
                        continue;
                    }
                    Diff::Reset => {
                        vstat_log::debug!(
                            metric = self.config.id,
                            %key,
                            "value went in the unexpected direction, rebasing"
                        );
                        self.context.stats.note_pull_data_error(self.config.id);
                        complete = false;
                        continue;
                    }
                },
                false => value,
            };

            interval.aggregate(value, self.config.aggregation);
        }

        // Only report to anomaly detection when every value field contributed.
        if complete {
            if let Some(value) = dimension.intervals.first().and_then(|i| i.value) {
                let total = match state.full_bucket.get(&key) {
                    Some(&earlier) => earlier + value,
                    None => value,
                };
                self.context
                    .anomaly
                    .on_updated_aggregate(&key, state.bucket_num, total);
            }
        }
    }

    fn flush_if_needed_locked(&self, state: &mut EngineState, timestamp: ElapsedTimestamp) {
        let end = self.bucket_end(state.bucket_num);
        if timestamp < end {
            return;
        }

        let forward = 1 + (timestamp.as_nanos() - end.as_nanos()) / self.bucket_nanos;
        let next_start = ElapsedTimestamp::from_nanos(
            end.as_nanos()
                .saturating_add((forward - 1).saturating_mul(self.bucket_nanos)),
        );

        self.flush_current_locked(state, timestamp, next_start);
        state.bucket_num += forward;

        if forward > 1 {
            vstat_log::debug!(
                metric = self.config.id,
                buckets = forward - 1,
                "skipped forward over empty buckets"
            );
            self.context
                .stats
                .note_skipped_forward_buckets(self.config.id);
            Self::reset_base_locked(state);
        }
    }

    /// Computes the output of the current bucket if it ended at `timestamp`.
    fn close_bucket(&self, state: &EngineState, timestamp: ElapsedTimestamp) -> ClosedBucket {
        let start = state.bucket_start;
        let end = timestamp.min(self.bucket_end(state.bucket_num));
        let span = SkippedSpan { start, end };

        if end - start < self.config.min_bucket_size() {
            return ClosedBucket::Skipped(span, "too_short");
        }

        if !state.condition_true_in_bucket {
            return ClosedBucket::Skipped(span, "condition_false");
        }

        let skip_zero = self.use_diff && self.config.skip_zero_diff_output;
        let buckets = state
            .sliced
            .iter()
            .filter_map(|(key, dimension)| {
                let values = dimension
                    .intervals
                    .iter()
                    .enumerate()
                    .filter_map(|(index, interval)| {
                        let value = interval.output(self.config.aggregation, skip_zero)?;
                        Some(IndexedValue { index, value })
                    })
                    .collect::<Vec<_>>();

                if values.is_empty() {
                    return None;
                }

                Some((key.clone(), ValueBucket { start, end, values }))
            })
            .collect();

        ClosedBucket::Reported(buckets)
    }

    fn flush_current_locked(
        &self,
        state: &mut EngineState,
        timestamp: ElapsedTimestamp,
        next_start: ElapsedTimestamp,
    ) {
        let full_end = self.bucket_end(state.bucket_num);

        match self.close_bucket(state, timestamp) {
            ClosedBucket::Reported(buckets) => {
                vstat_log::trace!(
                    metric = self.config.id,
                    dimensions = buckets.len(),
                    "closed bucket"
                );
                for (key, bucket) in buckets {
                    state.past.entry(key).or_default().push(bucket);
                }
                metric!(
                    counter(MetricCounters::BucketClosed) += 1,
                    outcome = "reported"
                );
            }
            ClosedBucket::Skipped(span, reason) => {
                vstat_log::debug!(
                    metric = self.config.id,
                    start = %span.start,
                    end = %span.end,
                    reason,
                    "skipped bucket"
                );
                state.skipped.push(span);
                metric!(
                    counter(MetricCounters::BucketClosed) += 1,
                    outcome = reason
                );
            }
        }

        if timestamp >= full_end {
            let mut full_bucket = std::mem::take(&mut state.full_bucket);
            for (key, dimension) in &state.sliced {
                if let Some(value) = dimension.intervals.first().and_then(|i| i.value) {
                    let total = match full_bucket.remove(key) {
                        Some(earlier) => earlier + value,
                        None => value,
                    };
                    self.context
                        .anomaly
                        .on_bucket_closed(key, state.bucket_num, total);
                }
            }
            for (key, value) in full_bucket {
                self.context
                    .anomaly
                    .on_bucket_closed(&key, state.bucket_num, value);
            }
        } else {
            for (key, dimension) in &state.sliced {
                if let Some(value) = dimension.intervals.first().and_then(|i| i.value) {
                    match state.full_bucket.get_mut(key) {
                        Some(total) => *total += value,
                        None => {
                            state.full_bucket.insert(key.clone(), value);
                        }
                    }
                }
            }
        }

        state.sliced.retain(|_, dimension| {
            for interval in &mut dimension.intervals {
                interval.reset_bucket();
            }
            dimension.has_base()
        });
        state.rejected.clear();

        state.bucket_start = next_start;
        state.condition_true_in_bucket = state.condition;
    }
}

/// Output of closing a bucket.
enum ClosedBucket {
    /// The bucket is reported with values for these dimensions.
    Reported(Vec<(DimensionKey, ValueBucket)>),
    /// The bucket is skipped for the given reason.
    Skipped(SkippedSpan, &'static str),
}

impl SampleReceiver for AggregationEngine {
    fn on_samples(&self, samples: &[Sample]) {
        let mut state = self.state.lock();

        if self.config.is_pulled() {
            if let Some(first) = samples.first() {
                if state.condition {
                    self.accumulate_pulled(&mut state, samples, first.elapsed);
                }
            }
            return;
        }

        for sample in samples {
            self.on_pushed_locked(&mut state, sample);
        }
    }
}

impl LifecycleListener for AggregationEngine {
    fn on_condition_changed(&self, met: bool, timestamp: ElapsedTimestamp) {
        let mut state = self.state.lock();

        if timestamp < state.bucket_start {
            self.note_late(&mut state, timestamp, "condition change");
            if self.use_diff && state.condition && !met {
                Self::reset_base_locked(&mut state);
            }
            state.condition = met;
            state.condition_true_in_bucket |= met;
            return;
        }

        if state.condition == met {
            self.flush_if_needed_locked(&mut state, timestamp);
            return;
        }

        if met {
            self.flush_if_needed_locked(&mut state, timestamp);
            if self.config.is_pulled() {
                self.pull_and_accumulate(&mut state, timestamp, timestamp);
            }
            state.condition = true;
            state.condition_true_in_bucket = true;
        } else {
            if self.config.is_pulled() {
                self.pull_before(&mut state, timestamp);
            }
            self.flush_if_needed_locked(&mut state, timestamp);
            if self.use_diff {
                Self::reset_base_locked(&mut state);
            }
            state.condition = false;
            if state.bucket_start >= timestamp {
                state.condition_true_in_bucket = false;
            }
        }
    }

    fn on_upgrade(&self, timestamp: ElapsedTimestamp) {
        self.flush_partial_bucket(timestamp);
    }
}

impl PullDataReceiver for AggregationEngine {
    fn on_data_pulled(&self, result: Result<&[Sample], &PullError>, timestamp: ElapsedTimestamp) {
        let mut state = self.state.lock();

        if state.condition {
            match result {
                Ok(samples) => {
                    // A pull in the middle of the bucket is taken as is. Otherwise it belongs to the
                    // bucket that just ended, even if the alarm fired late.
                    let event_time = match timestamp < self.bucket_end(state.bucket_num) {
                        true => timestamp,
                        false => self.previous_bucket_end(timestamp).prev(),
                    };
                    self.accumulate_pulled(&mut state, samples, event_time);
                }
                Err(error) => {
                    vstat_log::debug!(
                        metric = self.config.id,
                        error = error as &dyn Error,
                        "scheduled pull failed, invalidating bases"
                    );
                    Self::reset_base_locked(&mut state);
                }
            }
        }

        self.flush_if_needed_locked(&mut state, timestamp);
    }
}
