//! Common data model of the vstat collection core.
//!
//! This crate defines the types shared between the pull layer and the aggregation engine:
//! identifiers, the two clocks every sample is stamped with, field and aggregate values, samples
//! and dimension keys. It also hosts the [`GuardrailStats`] sink through which both layers report
//! their health.

#![warn(missing_docs)]

mod guardrail;
mod sample;
mod statsd;
mod time;
mod value;

pub use self::guardrail::*;
pub use self::sample::*;
pub use self::time::*;
pub use self::value::*;

/// Identifies a data source, the tag shared by all samples of one kind.
pub type TagId = u32;

/// Identifies a metric definition.
pub type MetricId = i64;

/// Identifies an event matcher.
pub type MatcherId = i64;

/// Identifies a condition.
pub type ConditionId = i64;
