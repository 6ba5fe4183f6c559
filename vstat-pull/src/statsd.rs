use vstat_statsd::{CounterMetric, TimerMetric};

/// Counter metrics for the pull layer.
pub enum PullCounters {
    /// Number of cached samples freed by cache clears.
    ///
    /// This metric is tagged with:
    ///  - `kind`: `forced` for explicit clears, `sweep` for periodic stale sweeps.
    CacheCleared,
    /// Incremented for every receiver that was dropped without unregistering.
    ReceiverPruned,
}

impl CounterMetric for PullCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::CacheCleared => "pull.cache.cleared",
            Self::ReceiverPruned => "pull.receiver.pruned",
        }
    }
}

/// Timer metrics for the pull layer.
pub enum PullTimers {
    /// Time spent pulling and delivering samples when the pull alarm fires.
    AlarmFired,
}

impl TimerMetric for PullTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::AlarmFired => "pull.alarm.duration",
        }
    }
}
