use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parameters of the internal telemetry client.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address of the statsd server, for example `"127.0.0.1:8125"`.
    ///
    /// Defaults to `None`, which disables internal telemetry.
    pub statsd: Option<String>,

    /// Prefix prepended to every metric name.
    ///
    /// Defaults to `"vstat"`.
    pub prefix: String,

    /// Tags added to every metric.
    pub default_tags: BTreeMap<String, String>,

    /// Fraction of metric events that are sent, between `0.0` and `1.0`.
    ///
    /// Defaults to `1.0`, which sends every event.
    pub sample_rate: f64,

    /// Packs multiple metrics into one datagram instead of sending each immediately.
    ///
    /// Defaults to `true`.
    pub buffered: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "vstat".to_owned(),
            default_tags: BTreeMap::new(),
            sample_rate: 1.0,
            buffered: true,
        }
    }
}
