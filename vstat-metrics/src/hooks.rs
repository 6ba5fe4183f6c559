//! Collaborators consulted by the [`AggregationEngine`](crate::AggregationEngine).

use vstat_common::{ConditionId, DimensionKey, MatcherId, Sample, Value};

/// Decides whether a sample belongs to a metric.
pub trait EventMatcher: Send + Sync {
    /// Returns `true` if `sample` matches the matcher `matcher`.
    fn matches(&self, matcher: MatcherId, sample: &Sample) -> bool;
}

impl<F> EventMatcher for F
where
    F: Fn(MatcherId, &Sample) -> bool + Send + Sync,
{
    fn matches(&self, matcher: MatcherId, sample: &Sample) -> bool {
        self(matcher, sample)
    }
}

/// Matches every sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchAll;

impl EventMatcher for MatchAll {
    fn matches(&self, _matcher: MatcherId, _sample: &Sample) -> bool {
        true
    }
}

/// The state of a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionState {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not enough is known to evaluate the condition.
    Unknown,
}

impl ConditionState {
    /// Returns `true` only if the condition is known to hold.
    pub fn is_true(self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<bool> for ConditionState {
    fn from(value: bool) -> Self {
        match value {
            true => Self::True,
            false => Self::False,
        }
    }
}

/// Evaluates sliced conditions.
pub trait ConditionEvaluator: Send + Sync {
    /// Returns the state of `condition` for the dimension `key`.
    fn query(&self, condition: ConditionId, key: &DimensionKey) -> ConditionState;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(ConditionId, &DimensionKey) -> ConditionState + Send + Sync,
{
    fn query(&self, condition: ConditionId, key: &DimensionKey) -> ConditionState {
        self(condition, key)
    }
}

/// Knows nothing about any condition.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnknownConditions;

impl ConditionEvaluator for UnknownConditions {
    fn query(&self, _condition: ConditionId, _key: &DimensionKey) -> ConditionState {
        ConditionState::Unknown
    }
}

/// Receives aggregates for threshold alerting.
///
/// Values are those of the first value field.
#[allow(unused_variables)]
pub trait AnomalyHook: Send + Sync {
    /// Called after a dimension was updated, with its value accumulated over the full bucket so far.
    fn on_updated_aggregate(&self, key: &DimensionKey, bucket_num: u64, value: Value) {}

    /// Called for every dimension with a value when a full bucket ends.
    fn on_bucket_closed(&self, key: &DimensionKey, bucket_num: u64, value: Value) {}
}

/// Ignores all aggregates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAnomalyHook;

impl AnomalyHook for NoopAnomalyHook {}
