//! Internal health telemetry for vstat, sent to a statsd server through `cadence`.
//!
//! These metrics describe vstat itself: pull attempts, cache hits, fetch latencies, guardrail hits
//! and closed buckets. They are unrelated to the value metrics vstat computes from samples.
//!
//! ## Defining Metrics
//!
//! Every crate declares its metric names as enums implementing one of [`CounterMetric`],
//! [`GaugeMetric`] or [`TimerMetric`]. The traits only carry the name, and ensure that a counter
//! cannot be emitted as a gauge by accident.
//!
//! ```
//! use vstat_statsd::{metric, CounterMetric};
//!
//! enum PullCounters {
//!     Requested,
//! }
//!
//! impl CounterMetric for PullCounters {
//!     fn name(&self) -> &'static str {
//!         match self {
//!             Self::Requested => "pull.requested",
//!         }
//!     }
//! }
//!
//! metric!(counter(PullCounters::Requested) += 1, tag = "10000");
//! ```
//!
//! ## Initializing the Client
//!
//! Without a client, the [`metric!`] macro does nothing. [`init`] creates a client from a
//! [`MetricsConfig`]. With the `test` feature, tests capture emitted metrics with
//! `with_capturing_test_client`.

#![warn(missing_docs)]

use std::cell::RefCell;
use std::net::UdpSocket;
use std::ops::Deref;
use std::sync::Arc;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, MetricError, QueuingMetricSink, StatsdClient,
    UdpMetricSink,
};
use parking_lot::RwLock;
use rand::Rng;

mod config;

pub use self::config::*;

/// Maximum number of metric events queued for sending before new events are dropped.
const MAX_QUEUE_SIZE: usize = 100_000;

/// A statsd client with the tags and sample rate applied to every metric.
#[derive(Debug)]
pub struct MetricsClient {
    /// The underlying statsd client.
    pub statsd_client: StatsdClient,
    /// Tags added to every metric.
    pub default_tags: Vec<(String, String)>,
    /// Fraction of events that are sent, clamped to `0.0..=1.0`.
    pub sample_rate: f64,
}

impl MetricsClient {
    /// Creates a client that sends every event with no default tags.
    pub fn new(statsd_client: StatsdClient) -> Self {
        Self {
            statsd_client,
            default_tags: Vec::new(),
            sample_rate: 1.0,
        }
    }

    /// Adds the default tags, applies sampling, and sends `metric`.
    #[inline]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        if self.sample_rate <= 0.0 {
            return;
        }

        if self.sample_rate < 1.0 {
            if !rand::rng().random_bool(self.sample_rate) {
                return;
            }
            metric = metric.with_sampling_rate(self.sample_rate);
        }

        for (key, value) in &self.default_tags {
            metric = metric.with_tag(key, value);
        }

        if let Err(error) = metric.try_send() {
            vstat_log::error!(
                error = &error as &dyn std::error::Error,
                max_queue_size = MAX_QUEUE_SIZE,
                "failed to send a metric"
            );
        }
    }
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

static GLOBAL_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: RefCell<Option<Arc<MetricsClient>>> =
        RefCell::new(GLOBAL_CLIENT.read().clone());
}

/// Used by [`metric!`].
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// Installs `client` for all threads.
///
/// Threads that already emitted metrics keep their previous client, except for the calling thread.
pub fn set_client(client: MetricsClient) {
    let client = Arc::new(client);
    *GLOBAL_CLIENT.write() = Some(Arc::clone(&client));
    CURRENT_CLIENT.with(|cell| cell.replace(Some(client)));
}

/// Removes the global client.
pub fn disable() {
    *GLOBAL_CLIENT.write() = None;
    CURRENT_CLIENT.with(|cell| cell.replace(None));
}

/// Creates a client sending to the configured statsd server and installs it.
///
/// Does nothing if no server is configured. Returns an error if the server address cannot be
/// resolved or the local socket cannot be opened.
pub fn init(config: &MetricsConfig) -> Result<(), MetricError> {
    let Some(host) = config.statsd.as_deref() else {
        vstat_log::debug!("no statsd server configured, internal metrics are disabled");
        return Ok(());
    };

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let statsd_client = match config.buffered {
        true => {
            let sink = BufferedUdpMetricSink::from(host, socket)?;
            let sink = QueuingMetricSink::with_capacity(sink, MAX_QUEUE_SIZE);
            StatsdClient::from_sink(&config.prefix, sink)
        }
        false => {
            let sink = UdpMetricSink::from(host, socket)?;
            let sink = QueuingMetricSink::with_capacity(sink, MAX_QUEUE_SIZE);
            StatsdClient::from_sink(&config.prefix, sink)
        }
    };

    vstat_log::info!(host, sample_rate = config.sample_rate, "reporting metrics to statsd");

    set_client(MetricsClient {
        statsd_client,
        default_tags: config
            .default_tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        sample_rate: config.sample_rate.clamp(0.0, 1.0),
    });

    Ok(())
}

/// Calls `f` with the client of the current thread.
///
/// Returns the default of `R` without calling `f` if no client is installed.
#[inline]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|cell| match cell.borrow().as_deref() {
        Some(client) => f(client),
        None => R::default(),
    })
}

/// Runs `f` with a client that records all metrics, and returns them in statsd line format.
///
/// Only affects the current thread. Requires the `test` feature.
#[cfg(any(test, feature = "test"))]
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let client = MetricsClient::new(StatsdClient::from_sink("", sink));

    CURRENT_CLIENT.with(|cell| {
        let previous = cell.replace(Some(Arc::new(client)));
        f();
        cell.replace(previous);
    });

    rx.iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

/// A counter, incremented for every occurrence of an event.
///
/// ```
/// use vstat_statsd::{metric, CounterMetric};
///
/// struct CacheCleared;
///
/// impl CounterMetric for CacheCleared {
///     fn name(&self) -> &'static str {
///         "pull.cache.cleared"
///     }
/// }
///
/// metric!(counter(CacheCleared) += 3, kind = "sweep");
/// ```
pub trait CounterMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// A gauge, set to the latest observed value.
///
/// ```
/// use vstat_statsd::{metric, GaugeMetric};
///
/// struct DimensionSize;
///
/// impl GaugeMetric for DimensionSize {
///     fn name(&self) -> &'static str {
///         "metrics.dimension.size"
///     }
/// }
///
/// metric!(gauge(DimensionSize) = 512, metric = "42");
/// ```
pub trait GaugeMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// A duration, reported in milliseconds.
///
/// ```
/// use std::time::Duration;
/// use vstat_statsd::{metric, TimerMetric};
///
/// struct PullTime;
///
/// impl TimerMetric for PullTime {
///     fn name(&self) -> &'static str {
///         "pull.duration"
///     }
/// }
///
/// metric!(timer(PullTime) = Duration::from_millis(20), tag = "10000");
///
/// // Times the block and returns its value.
/// let samples = metric!(timer(PullTime), tag = "10000", { vec![1, 2, 3] });
/// assert_eq!(samples.len(), 3);
/// ```
pub trait TimerMetric {
    /// Returns the name sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric through the client of the current thread.
///
/// Tags are given as `key = value` pairs after the metric, where values are string slices. Keys may
/// contain dots. See the metric traits for examples.
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            0 => {}
            value => $crate::with_client(|client| {
                use $crate::_pred::*;
                client.send_metric(
                    client.count_with_tags($crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($($k).*), $v))*
                )
            }),
        }
    };

    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.gauge_with_tags($crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            // Durations are sent as fractional milliseconds.
            let millis = $value.as_nanos() as f64 / 1e6;
            client.send_metric(
                client.distribution_with_tags($crate::TimerMetric::name(&$id), millis)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $crate::metric!(timer($id) = start.elapsed() $(, $($k).* = $v)*);
        result
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cadence::NopMetricSink;
    use cadence::prelude::*;

    use super::*;

    enum TestCounters {
        Pulls,
    }

    impl CounterMetric for TestCounters {
        fn name(&self) -> &'static str {
            match self {
                Self::Pulls => "pull.requested",
            }
        }
    }

    struct TestGauge;

    impl GaugeMetric for TestGauge {
        fn name(&self) -> &'static str {
            "pull.min_interval"
        }
    }

    struct TestTimer;

    impl TimerMetric for TestTimer {
        fn name(&self) -> &'static str {
            "pull.duration"
        }
    }

    #[test]
    fn test_no_client_is_noop() {
        // Must not panic without an installed client.
        metric!(counter(TestCounters::Pulls) += 1);
        assert!(!with_client(|_| true));
    }

    #[test]
    fn test_capture_with_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(gauge(TestGauge) = 1500, tag = "10000");
            metric!(counter(TestCounters::Pulls) += 2, tag = "10000", pull.kind = "alarm");
        });

        assert_eq!(
            captures,
            [
                "pull.min_interval:1500|g|#tag:10000",
                "pull.requested:2|c|#tag:10000,pull.kind:alarm",
            ]
        );
    }

    #[test]
    fn test_zero_counter_is_skipped() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(TestCounters::Pulls) += 0);
            metric!(counter(TestCounters::Pulls) += -1);
        });
        assert_eq!(captures, ["pull.requested:-1|c"]);
    }

    #[test]
    fn test_timer_in_millis() {
        let captures = with_capturing_test_client(|| {
            metric!(timer(TestTimer) = Duration::from_micros(2500), tag = "10000");
        });
        assert_eq!(captures, ["pull.duration:2.5|d|#tag:10000"]);
    }

    #[test]
    fn test_timed_block_returns_value() {
        let mut value = 0;
        let captures = with_capturing_test_client(|| {
            value = metric!(timer(TestTimer), tag = "10000", { 7 });
        });

        assert_eq!(value, 7);
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("pull.duration:"));
        assert!(captures[0].ends_with("|d|#tag:10000"));
    }

    #[test]
    fn test_default_tags_and_sampling() {
        let (rx, sink) = cadence::SpyMetricSink::new();
        let client = MetricsClient {
            default_tags: vec![("device".to_owned(), "emulator".to_owned())],
            ..MetricsClient::new(StatsdClient::from_sink("vstat", sink))
        };
        client.send_metric(client.count_with_tags("pull.requested", 1));

        let muted = MetricsClient {
            sample_rate: 0.0,
            ..MetricsClient::new(StatsdClient::from_sink("", NopMetricSink))
        };
        muted.send_metric(muted.count_with_tags("pull.requested", 1));

        drop(client);
        let lines: Vec<_> = rx
            .iter()
            .map(|line| String::from_utf8_lossy(&line).into_owned())
            .collect();
        assert_eq!(lines, ["vstat.pull.requested:1|c|#device:emulator"]);
    }
}
