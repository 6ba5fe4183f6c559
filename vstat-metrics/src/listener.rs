use vstat_common::{ElapsedTimestamp, Sample};

/// Consumes samples delivered by the ingestion dispatcher.
pub trait SampleReceiver: Send + Sync {
    /// Processes a batch of samples.
    ///
    /// Pushed samples are handled one by one in order. A batch for a pulled metric is treated as one
    /// snapshot taken at the elapsed time of its first sample.
    fn on_samples(&self, samples: &[Sample]);
}

/// Receives lifecycle events that close buckets or gate sampling.
pub trait LifecycleListener: Send + Sync {
    /// The overall condition of the metric changed to `met` at `timestamp`.
    fn on_condition_changed(&self, met: bool, timestamp: ElapsedTimestamp);

    /// An app was upgraded at `timestamp`, which closes the current partial bucket.
    fn on_upgrade(&self, timestamp: ElapsedTimestamp);
}
