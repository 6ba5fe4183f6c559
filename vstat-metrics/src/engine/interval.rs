use vstat_common::Value;

use crate::{Aggregation, ValueDirection};

/// Diff settings of a metric.
#[derive(Clone, Copy, Debug)]
pub struct DiffPolicy {
    pub direction: ValueDirection,
    pub absolute_on_reset: bool,
    /// Diff against zero when there is no base but a global base exists.
    pub zero_default_base: bool,
}

/// Outcome of feeding a value through [`Interval::diff`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Diff {
    /// The value to aggregate.
    Value(Value),
    /// The value became the first base, nothing to aggregate.
    FirstBase,
    /// The value went in the wrong direction and became the new base.
    Reset,
}

/// Diff and aggregation state of one value field of one dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Interval {
    /// The previous value to diff against.
    pub base: Option<Value>,
    /// The aggregate of the current bucket, `None` until the first contribution.
    pub value: Option<Value>,
    /// Number of contributions to the current bucket.
    pub sample_count: u64,
}

impl Interval {
    /// Computes the diff of `value` against the base and moves the base to `value`.
    pub fn diff(&mut self, value: Value, policy: DiffPolicy, has_global_base: bool) -> Diff {
        let base = match self.base {
            Some(base) => base,
            None if has_global_base && policy.zero_default_base => value.zero_like(),
            None => {
                self.base = Some(value);
                return Diff::FirstBase;
            }
        };

        let diff = match policy.direction {
            ValueDirection::Increasing if value >= base => value - base,
            ValueDirection::Decreasing if base >= value => base - value,
            ValueDirection::Any => value - base,
            _ if policy.absolute_on_reset => value,
            _ => {
                self.base = Some(value);
                return Diff::Reset;
            }
        };

        self.base = Some(value);
        Diff::Value(diff)
    }

    /// Adds `value` to the aggregate of the current bucket.
    pub fn aggregate(&mut self, value: Value, aggregation: Aggregation) {
        self.value = Some(match (self.value, aggregation) {
            (None, _) => value,
            (Some(current), Aggregation::Sum | Aggregation::Avg) => current + value,
            (Some(current), Aggregation::Min) => current.min(value),
            (Some(current), Aggregation::Max) => current.max(value),
        });
        self.sample_count += 1;
    }

    /// Returns the reported value of the current bucket.
    ///
    /// Returns `None` if nothing was aggregated, or if the diff is zero and zero diffs are skipped.
    pub fn output(&self, aggregation: Aggregation, skip_zero_diff: bool) -> Option<Value> {
        let value = self.value?;
        if skip_zero_diff && value.is_zero() {
            return None;
        }

        match aggregation {
            Aggregation::Avg if self.sample_count > 0 => {
                Some(Value::Double(value.as_f64() / self.sample_count as f64))
            }
            _ => Some(value),
        }
    }

    /// Clears the aggregate of the current bucket, keeping the base.
    pub fn reset_bucket(&mut self) {
        self.value = None;
        self.sample_count = 0;
    }
}
