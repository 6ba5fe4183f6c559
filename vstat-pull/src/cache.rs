use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use vstat_common::{Clock, ElapsedTimestamp, GuardrailStats, Sample, TagId};

use crate::{DataSource, FetchError, PullSpec, UidRemapper, map_and_merge_isolated_uids};

/// An error returned by [`Puller::pull`].
#[derive(Debug, thiserror::Error)]
pub enum PullError {
    /// The data source failed to produce samples.
    #[error("failed to pull tag {tag}")]
    Fetch {
        /// The pulled tag.
        tag: TagId,
        /// The error of the data source.
        #[source]
        source: FetchError,
    },
    /// The last pull failed less than one cooldown ago.
    #[error("pull of tag {tag} failed recently")]
    RecentFailure {
        /// The pulled tag.
        tag: TagId,
    },
    /// No cache is registered for the tag.
    #[error("unknown pull tag {0}")]
    UnknownTag(TagId),
}

/// Source of pulled samples for a single tag.
pub trait Puller: Send + Sync {
    /// Returns the samples of the tag as of `timestamp`.
    fn pull(&self, timestamp: ElapsedTimestamp) -> Result<Arc<[Sample]>, PullError>;
}

/// Content of the cache after the last fresh pull.
#[derive(Debug, Default)]
enum Cached {
    /// Nothing was pulled yet, or the samples were cleared.
    #[default]
    Empty,
    /// Samples of the last successful pull.
    Samples(Arc<[Sample]>),
    /// The last pull failed.
    Failed,
}

/// Critical section of the [`PullCache`].
#[derive(Debug, Default)]
struct CacheEntry {
    cached: Cached,
    last_pull: Option<ElapsedTimestamp>,
    min_pull_interval: Option<Duration>,
}

/// Throttles and caches pulls of a single tag.
///
/// At most one pull is in flight at any time. Concurrent callers wait for the running pull and are
/// then served from its result.
pub struct PullCache {
    spec: PullSpec,
    source: Arc<dyn DataSource>,
    remapper: Arc<dyn UidRemapper>,
    clock: Arc<dyn Clock>,
    stats: Arc<dyn GuardrailStats>,
    inner: Mutex<CacheEntry>,
}

impl PullCache {
    /// Creates an empty cache for the tag described by `spec`.
    pub fn new(
        spec: PullSpec,
        source: Arc<dyn DataSource>,
        remapper: Arc<dyn UidRemapper>,
        clock: Arc<dyn Clock>,
        stats: Arc<dyn GuardrailStats>,
    ) -> Self {
        Self {
            spec,
            source,
            remapper,
            clock,
            stats,
            inner: Mutex::new(CacheEntry::default()),
        }
    }

    /// Returns the tag pulled by this cache.
    pub fn tag(&self) -> TagId {
        self.spec.tag
    }

    /// Returns the pull properties of this cache.
    pub fn spec(&self) -> &PullSpec {
        &self.spec
    }

    /// Frees the cached samples and forgets when the last pull happened.
    ///
    /// The next pull always consults the data source. Returns the number of freed samples.
    pub fn clear_cache(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.last_pull = None;
        Self::take_samples(&mut inner)
    }

    /// Frees the cached samples if they are older than one cooldown.
    ///
    /// Unlike [`clear_cache`](Self::clear_cache), the time of the last pull is kept. Returns the
    /// number of freed samples.
    pub fn clear_cache_if_necessary(&self, timestamp: ElapsedTimestamp) -> usize {
        let mut inner = self.inner.lock();
        match inner.last_pull {
            Some(last_pull) if timestamp - last_pull > self.spec.cooldown => {
                Self::take_samples(&mut inner)
            }
            _ => 0,
        }
    }

    fn take_samples(inner: &mut CacheEntry) -> usize {
        match std::mem::take(&mut inner.cached) {
            Cached::Samples(samples) => samples.len(),
            Cached::Empty | Cached::Failed => 0,
        }
    }

    fn fetch(&self, timestamp: ElapsedTimestamp) -> Result<Arc<[Sample]>, FetchError> {
        let wall_clock = self.clock.wall_now();

        let start = Instant::now();
        let mut samples = self.source.fetch(self.spec.tag)?;
        self.stats.note_pull_time(self.spec.tag, start.elapsed());

        for sample in &mut samples {
            sample.elapsed = timestamp;
            sample.wall_clock = wall_clock;
        }

        let samples = map_and_merge_isolated_uids(samples, &self.spec, self.remapper.as_ref());
        Ok(samples.into())
    }
}

impl Puller for PullCache {
    fn pull(&self, timestamp: ElapsedTimestamp) -> Result<Arc<[Sample]>, PullError> {
        let tag = self.spec.tag;
        let mut inner = self.inner.lock();
        self.stats.note_pull(tag);

        if let Some(last_pull) = inner.last_pull {
            if timestamp - last_pull < self.spec.cooldown {
                match &inner.cached {
                    Cached::Samples(samples) => {
                        self.stats.note_pull_from_cache(tag);
                        self.stats
                            .note_pull_delay(tag, self.clock.elapsed_now() - timestamp);
                        return Ok(Arc::clone(samples));
                    }
                    Cached::Failed => {
                        self.stats.note_pull_failed(tag);
                        return Err(PullError::RecentFailure { tag });
                    }
                    Cached::Empty => (),
                }
            }

            let interval = timestamp - last_pull;
            if inner.min_pull_interval.is_none_or(|min| interval < min) {
                inner.min_pull_interval = Some(interval);
                self.stats.update_min_pull_interval(tag, interval);
            }
        }

        inner.cached = Cached::Empty;
        inner.last_pull = Some(timestamp);

        match self.fetch(timestamp) {
            Ok(samples) => {
                vstat_log::trace!(tag, count = samples.len(), "pulled samples");
                self.stats
                    .note_pull_delay(tag, self.clock.elapsed_now() - timestamp);
                inner.cached = Cached::Samples(Arc::clone(&samples));
                Ok(samples)
            }
            Err(error) => {
                vstat_log::warn!(
                    tag,
                    error = &error as &dyn Error,
                    "failed to pull samples"
                );
                self.stats.note_pull_failed(tag);
                inner.cached = Cached::Failed;
                Err(PullError::Fetch { tag, source: error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vstat_common::{FieldValue, GuardrailRecorder, ManualClock, WallClockTimestamp};

    use super::*;
    use crate::IsolatedUidMap;

    const TAG: TagId = 10_000;

    /// Data source returning a growing counter, or failing on demand.
    #[derive(Default)]
    struct CountingSource {
        fetches: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl DataSource for CountingSource {
        fn fetch(&self, tag: TagId) -> Result<Vec<Sample>, FetchError> {
            let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Unavailable(tag));
            }
            Ok(vec![Sample::new(
                tag,
                ElapsedTimestamp::ZERO,
                WallClockTimestamp::default(),
                vec![FieldValue::Int(1000), FieldValue::Int(count as i64)],
            )])
        }
    }

    struct Setup {
        source: Arc<CountingSource>,
        clock: Arc<ManualClock>,
        stats: Arc<GuardrailRecorder>,
        cache: PullCache,
    }

    fn setup(cooldown: Duration) -> Setup {
        let source = Arc::new(CountingSource::default());
        let clock = Arc::new(ManualClock::new(
            ElapsedTimestamp::ZERO,
            WallClockTimestamp::from_nanos(1_000_000),
        ));
        let stats = Arc::new(GuardrailRecorder::new());
        let cache = PullCache::new(
            PullSpec::new(TAG, cooldown),
            source.clone(),
            Arc::new(IsolatedUidMap::new()),
            clock.clone(),
            stats.clone(),
        );

        Setup {
            source,
            clock,
            stats,
            cache,
        }
    }

    fn secs(secs: u64) -> ElapsedTimestamp {
        ElapsedTimestamp::from_secs(secs)
    }

    #[test]
    fn test_pull_within_cooldown_is_cached() {
        vstat_log::init_test!();
        let Setup {
            source,
            clock,
            stats,
            cache,
        } = setup(Duration::from_secs(1));

        clock.set(secs(10));
        let first = cache.pull(secs(10)).unwrap();
        clock.set(secs(10) + Duration::from_millis(999));
        let second = cache.pull(secs(10) + Duration::from_millis(999)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let pull_stats = stats.pull_stats(TAG);
        assert_eq!(pull_stats.pulls, 2);
        assert_eq!(pull_stats.cache_hits, 1);
        assert_eq!(pull_stats.fetches, 1);
        assert_eq!(pull_stats.max_pull_delay, Duration::ZERO);
    }

    #[test]
    fn test_pull_delay_is_measured_from_request() {
        let Setup {
            clock,
            stats,
            cache,
            ..
        } = setup(Duration::from_secs(1));

        // A fresh fetch served two seconds after the requested time.
        clock.set(secs(12));
        cache.pull(secs(10)).unwrap();
        assert_eq!(stats.pull_stats(TAG).max_pull_delay, Duration::from_secs(2));

        // A cache hit is measured against its own request, not the time of the cached pull.
        clock.set(secs(20));
        cache.pull(secs(10) + Duration::from_millis(500)).unwrap();

        let pull_stats = stats.pull_stats(TAG);
        assert_eq!(pull_stats.cache_hits, 1);
        assert_eq!(pull_stats.max_pull_delay, Duration::from_millis(9_500));
    }

    #[test]
    fn test_failed_fetch_records_no_pull_time() {
        let Setup {
            source,
            stats,
            cache,
            ..
        } = setup(Duration::from_secs(1));

        source.fail.store(true, Ordering::SeqCst);
        cache.pull(secs(1)).unwrap_err();

        let pull_stats = stats.pull_stats(TAG);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(pull_stats.fetches, 0);
        assert_eq!(pull_stats.failures, 1);
    }

    #[test]
    fn test_pull_stamps_samples() {
        let Setup { clock, cache, .. } = setup(Duration::from_secs(1));

        clock.set(secs(3));
        let samples = cache.pull(secs(3)).unwrap();
        assert_eq!(samples[0].elapsed, secs(3));
        assert_eq!(
            samples[0].wall_clock,
            WallClockTimestamp::from_nanos(1_000_000 + 3_000_000_000)
        );
    }

    #[test]
    fn test_pull_after_cooldown_fetches_once() {
        let Setup {
            source,
            stats,
            cache,
            ..
        } = setup(Duration::from_secs(1));

        cache.pull(secs(10)).unwrap();
        let samples = cache.pull(secs(11)).unwrap();

        assert_eq!(samples[0].fields[1], FieldValue::Int(2));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(
            stats.pull_stats(TAG).min_pull_interval,
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_failed_pull_is_not_served_stale() {
        let Setup {
            source,
            stats,
            cache,
            ..
        } = setup(Duration::from_secs(1));

        cache.pull(secs(10)).unwrap();
        source.fail.store(true, Ordering::SeqCst);

        let error = cache.pull(secs(12)).unwrap_err();
        assert!(matches!(error, PullError::Fetch { tag: TAG, .. }));

        // Within the cooldown of the failure, the source is not consulted again.
        let error = cache.pull(secs(12) + Duration::from_millis(500)).unwrap_err();
        assert!(matches!(error, PullError::RecentFailure { tag: TAG }));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.clear_cache(), 0);

        // After the cooldown, the source recovers.
        source.fail.store(false, Ordering::SeqCst);
        let samples = cache.pull(secs(14)).unwrap();
        assert_eq!(samples[0].fields[1], FieldValue::Int(3));
        assert_eq!(stats.pull_stats(TAG).failures, 2);
    }

    #[test]
    fn test_clear_cache_forces_fetch() {
        let Setup { source, cache, .. } = setup(Duration::from_secs(10));

        cache.pull(secs(1)).unwrap();
        assert_eq!(cache.clear_cache(), 1);
        cache.pull(secs(2)).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_cache_if_necessary() {
        let Setup { source, cache, .. } = setup(Duration::from_secs(10));

        cache.pull(secs(1)).unwrap();
        assert_eq!(cache.clear_cache_if_necessary(secs(5)), 0);
        assert_eq!(cache.clear_cache_if_necessary(secs(12)), 1);
        assert_eq!(cache.clear_cache_if_necessary(secs(13)), 0);

        cache.pull(secs(13)).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cleared_samples_within_cooldown_are_refetched() {
        let Setup { source, cache, .. } = setup(Duration::from_secs(10));

        cache.pull(secs(1)).unwrap();
        cache.clear_cache_if_necessary(secs(20));
        let samples = cache.pull(secs(5)).unwrap();

        assert_eq!(samples[0].fields[1], FieldValue::Int(2));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
