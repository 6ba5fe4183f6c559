use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A numeric aggregate value.
///
/// Arithmetic between a [`Value::Long`] and a [`Value::Double`] promotes the result to a double.
/// Integer arithmetic wraps instead of panicking, counters in the wild do overflow.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A 64-bit signed integer.
    Long(i64),
    /// A 64-bit float.
    Double(f64),
}

impl Value {
    /// The integer zero.
    pub const ZERO_LONG: Self = Self::Long(0);

    /// The float zero.
    pub const ZERO_DOUBLE: Self = Self::Double(0.0);

    /// Returns a zero of the same type as `self`.
    pub fn zero_like(self) -> Self {
        match self {
            Self::Long(_) => Self::ZERO_LONG,
            Self::Double(_) => Self::ZERO_DOUBLE,
        }
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(self) -> bool {
        match self {
            Self::Long(v) => v == 0,
            Self::Double(v) => v == 0.0,
        }
    }

    /// Converts the value into a float.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Long(v) => v as f64,
            Self::Double(v) => v,
        }
    }

    /// Returns the smaller of both values.
    pub fn min(self, other: Self) -> Self {
        if other < self { other } else { self }
    }

    /// Returns the larger of both values.
    pub fn max(self, other: Self) -> Self {
        if other > self { other } else { self }
    }
}

impl std::ops::Add for Value {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Long(a), Self::Long(b)) => Self::Long(a.wrapping_add(b)),
            (a, b) => Self::Double(a.as_f64() + b.as_f64()),
        }
    }
}

impl std::ops::AddAssign for Value {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Value {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Long(a), Self::Long(b)) => Self::Long(a.wrapping_sub(b)),
            (a, b) => Self::Double(a.as_f64() - b.as_f64()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::Long(a), Self::Long(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (*self, *other) {
            (Self::Long(a), Self::Long(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(v) => v.fmt(f),
            Self::Double(v) => v.fmt(f),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// A single field of a [`Sample`](crate::Sample).
///
/// Fields are totally ordered and hashable so that they can be part of a
/// [`DimensionKey`](crate::DimensionKey). Floats compare by their total order and hash by their
/// bit pattern.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// An integer field, such as a UID or a counter.
    Int(i64),
    /// A floating point field.
    Float(f64),
    /// A string field, such as a package or wakelock name.
    Str(String),
}

impl FieldValue {
    /// Returns the numeric value of this field, or `None` for strings.
    pub fn as_value(&self) -> Option<Value> {
        match *self {
            Self::Int(v) => Some(Value::Long(v)),
            Self::Float(v) => Some(Value::Double(v)),
            Self::Str(_) => None,
        }
    }

    /// Returns the integer value of this field.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Adds `value` to a numeric field in place.
    ///
    /// Returns `false` if the field is a string.
    pub fn add_assign(&mut self, value: &FieldValue) -> bool {
        let sum = match (&*self, value) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.wrapping_add(*b)),
            (Self::Float(a), Self::Float(b)) => Self::Float(a + b),
            (Self::Float(a), Self::Int(b)) => Self::Float(a + *b as f64),
            (Self::Int(a), Self::Float(b)) => Self::Float(*a as f64 + b),
            _ => return false,
        };
        *self = sum;
        true
    }

    /// Estimates the number of bytes this field occupies.
    pub fn cost(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Self::Str(s) => s.capacity(),
                _ => 0,
            }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Self::Int(_) => 0,
            Self::Float(_) => 1,
            Self::Str(_) => 2,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (a, b) => a.discriminant().cmp(&b.discriminant()),
        }
    }
}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Str(v) => v.hash(state),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::Str(v) => v.fmt(f),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
