use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{ElapsedTimestamp, FieldValue, TagId, Value, WallClockTimestamp};

/// A single record produced by a data source or pushed by a client.
///
/// Fields are addressed by their 1-based position, matching how metric definitions refer to them.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Sample {
    /// The data source that produced this sample.
    pub tag: TagId,
    /// The time on the elapsed clock this sample is attributed to.
    pub elapsed: ElapsedTimestamp,
    /// The wall clock time captured when the sample was produced.
    pub wall_clock: WallClockTimestamp,
    /// The ordered fields of the sample.
    pub fields: Vec<FieldValue>,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(
        tag: TagId,
        elapsed: ElapsedTimestamp,
        wall_clock: WallClockTimestamp,
        fields: Vec<FieldValue>,
    ) -> Self {
        Self {
            tag,
            elapsed,
            wall_clock,
            fields,
        }
    }

    /// Returns the field at the 1-based `position`.
    pub fn field(&self, position: usize) -> Option<&FieldValue> {
        position.checked_sub(1).and_then(|i| self.fields.get(i))
    }

    /// Returns a mutable reference to the field at the 1-based `position`.
    pub fn field_mut(&mut self, position: usize) -> Option<&mut FieldValue> {
        position.checked_sub(1).and_then(|i| self.fields.get_mut(i))
    }

    /// Returns the numeric value of the field at the 1-based `position`.
    ///
    /// Returns `None` if the field is missing or not numeric.
    pub fn value_at(&self, position: usize) -> Option<Value> {
        self.field(position).and_then(FieldValue::as_value)
    }

    /// Estimates the number of bytes held by this sample.
    pub fn cost(&self) -> usize {
        std::mem::size_of::<Self>() + self.fields.iter().map(FieldValue::cost).sum::<usize>()
    }
}

/// The values of the dimension fields of a sample.
///
/// Samples with equal dimension keys are aggregated into the same slice of a metric. The
/// default key, with no fields, is used by metrics that are not sliced at all.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct DimensionKey(SmallVec<[FieldValue; 3]>);

impl DimensionKey {
    /// Creates a dimension key from the given fields.
    pub fn new(fields: impl IntoIterator<Item = FieldValue>) -> Self {
        Self(fields.into_iter().collect())
    }

    /// Extracts the key from `sample` by reading the 1-based `positions`.
    ///
    /// Returns `None` if any of the fields is missing from the sample.
    pub fn from_sample(sample: &Sample, positions: &[usize]) -> Option<Self> {
        positions
            .iter()
            .map(|&position| sample.field(position).cloned())
            .collect::<Option<SmallVec<_>>>()
            .map(Self)
    }

    /// Returns the fields of this key.
    pub fn fields(&self) -> &[FieldValue] {
        &self.0
    }

    /// Returns `true` if the key has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Estimates the number of bytes held by this key.
    pub fn cost(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        let fields: usize = self.0.iter().map(FieldValue::cost).sum();

        match self.0.spilled() {
            true => inline + fields,
            false => inline + fields - self.0.len() * std::mem::size_of::<FieldValue>(),
        }
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            field.fmt(f)?;
        }
        f.write_str(")")
    }
}

impl FromIterator<FieldValue> for DimensionKey {
    fn from_iter<T: IntoIterator<Item = FieldValue>>(iter: T) -> Self {
        Self::new(iter)
    }
}
