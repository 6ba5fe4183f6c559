//! Throttled and cached pulls from system data sources.
//!
//! Pulled metrics do not receive their samples as they happen. Instead, a data source is asked for
//! a snapshot of all current values of a tag, typically at bucket boundaries or when a condition
//! changes. Fetching a snapshot can be expensive, so every tag has a [`PullCache`] which serves
//! repeated requests within a cooldown from the last snapshot.
//!
//! # Pulling
//!
//! A pull at a given elapsed timestamp goes through these steps:
//!
//!  1. If the last fresh pull happened less than one cooldown ago, the cached samples are returned.
//!     If that pull failed, the failure is returned again without consulting the data source.
//!  2. Otherwise, the [`DataSource`] is asked for the current samples of the tag.
//!  3. Every sample is stamped with the requested elapsed timestamp and the wall clock time
//!     captured right before the fetch started.
//!  4. Isolated UIDs are remapped to their host UIDs. For tags with additive fields, samples that
//!     become identical are merged by summing their additive fields.
//!  5. The result replaces the cache.
//!
//! # Scheduling
//!
//! The [`PullManager`] owns one cache per configured tag and drives bucket-boundary pulls for
//! registered [`PullDataReceiver`]s whenever the periodic alarm fires.

#![warn(missing_docs)]

mod cache;
mod config;
mod manager;
mod source;
mod statsd;
mod uid;

pub use self::cache::*;
pub use self::config::*;
pub use self::manager::*;
pub use self::source::*;
pub use self::uid::*;
