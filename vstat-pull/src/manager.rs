use std::sync::{Arc, Weak};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use vstat_common::{Clock, ElapsedTimestamp, GuardrailStats, Sample, TagId};
use vstat_statsd::metric;

use crate::statsd::{PullCounters, PullTimers};
use crate::{DataSource, PullCache, PullConfig, PullError, Puller, UidRemapper};

/// Receives the result of scheduled pulls.
pub trait PullDataReceiver: Send + Sync {
    /// Called with the outcome of the pull scheduled at `timestamp`.
    fn on_data_pulled(&self, result: Result<&[Sample], &PullError>, timestamp: ElapsedTimestamp);
}

/// A registered receiver and its schedule.
struct Registration {
    receiver: Weak<dyn PullDataReceiver>,
    next_pull: ElapsedTimestamp,
    interval: Duration,
}

impl Registration {
    /// Moves the next pull past `timestamp` by whole intervals.
    fn advance(&mut self, timestamp: ElapsedTimestamp) {
        let interval = u64::try_from(self.interval.as_nanos())
            .unwrap_or(u64::MAX)
            .max(1);
        let behind = u64::try_from((timestamp - self.next_pull).as_nanos()).unwrap_or(u64::MAX)
            / interval;
        let step = interval.saturating_mul(behind.saturating_add(1));
        self.next_pull = self.next_pull + Duration::from_nanos(step);
    }
}

/// Owns the pull caches of all tags and schedules bucket-boundary pulls.
///
/// Caches are registered once during setup. Afterwards the manager can be shared, and receivers
/// come and go as metrics are created and dropped.
pub struct PullManager {
    config: PullConfig,
    remapper: Arc<dyn UidRemapper>,
    clock: Arc<dyn Clock>,
    stats: Arc<dyn GuardrailStats>,
    caches: HashMap<TagId, Arc<PullCache>>,
    receivers: Mutex<HashMap<TagId, Vec<Registration>>>,
    last_sweep: Mutex<Option<ElapsedTimestamp>>,
}

impl PullManager {
    /// Creates a manager without any data sources.
    pub fn new(
        config: PullConfig,
        remapper: Arc<dyn UidRemapper>,
        clock: Arc<dyn Clock>,
        stats: Arc<dyn GuardrailStats>,
    ) -> Self {
        Self {
            config,
            remapper,
            clock,
            stats,
            caches: HashMap::new(),
            receivers: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(None),
        }
    }

    /// Registers the data source of `tag` and returns its cache.
    ///
    /// Registering a tag again replaces the previous cache.
    pub fn register_source(&mut self, tag: TagId, source: Arc<dyn DataSource>) -> Arc<PullCache> {
        let cache = Arc::new(PullCache::new(
            self.config.spec(tag),
            source,
            Arc::clone(&self.remapper),
            Arc::clone(&self.clock),
            Arc::clone(&self.stats),
        ));

        self.caches.insert(tag, Arc::clone(&cache));
        cache
    }

    /// Returns the cache of `tag`, if a data source was registered for it.
    pub fn puller(&self, tag: TagId) -> Option<Arc<PullCache>> {
        self.caches.get(&tag).cloned()
    }

    /// Pulls `tag` as of `timestamp`.
    pub fn pull(&self, tag: TagId, timestamp: ElapsedTimestamp) -> Result<Arc<[Sample]>, PullError> {
        match self.caches.get(&tag) {
            Some(cache) => cache.pull(timestamp),
            None => Err(PullError::UnknownTag(tag)),
        }
    }

    /// Schedules `receiver` to get pulls of `tag` every `interval`, starting at `next_pull`.
    ///
    /// The manager only holds a weak reference. Receivers that are dropped are pruned the next time
    /// the alarm fires.
    pub fn register_receiver(
        &self,
        tag: TagId,
        receiver: Weak<dyn PullDataReceiver>,
        next_pull: ElapsedTimestamp,
        interval: Duration,
    ) -> Result<(), PullError> {
        if !self.caches.contains_key(&tag) {
            return Err(PullError::UnknownTag(tag));
        }

        let mut receivers = self.receivers.lock();
        let registrations = receivers.entry(tag).or_default();
        if registrations
            .iter()
            .any(|r| Weak::ptr_eq(&r.receiver, &receiver))
        {
            vstat_log::debug!(tag, "receiver already registered");
            return Ok(());
        }

        vstat_log::debug!(tag, ?interval, "registered pull receiver");
        registrations.push(Registration {
            receiver,
            next_pull,
            interval,
        });

        Ok(())
    }

    /// Stops scheduled pulls of `tag` for `receiver`.
    pub fn unregister_receiver(&self, tag: TagId, receiver: &Weak<dyn PullDataReceiver>) {
        let mut receivers = self.receivers.lock();
        if let Some(registrations) = receivers.get_mut(&tag) {
            registrations.retain(|r| !Weak::ptr_eq(&r.receiver, receiver));
            if registrations.is_empty() {
                receivers.remove(&tag);
            }
        }
    }

    /// Pulls every tag with a due receiver and delivers the result.
    ///
    /// Each tag is pulled at most once, all of its due receivers get the same samples. Returns the
    /// earliest time any receiver is due again.
    pub fn on_alarm_fired(&self, timestamp: ElapsedTimestamp) -> Option<ElapsedTimestamp> {
        metric!(timer(PullTimers::AlarmFired), {
            let (due, next_alarm) = self.collect_due(timestamp);

            for (tag, receivers) in due {
                let result = self.pull(tag, timestamp);
                for receiver in receivers {
                    receiver.on_data_pulled(result.as_deref(), timestamp);
                }
            }

            next_alarm
        })
    }

    /// Collects due receivers and advances their schedule.
    ///
    /// The lock is released before any receiver is called, so receivers may register or unregister
    /// while handling a pull.
    fn collect_due(
        &self,
        timestamp: ElapsedTimestamp,
    ) -> (
        Vec<(TagId, Vec<Arc<dyn PullDataReceiver>>)>,
        Option<ElapsedTimestamp>,
    ) {
        let mut receivers = self.receivers.lock();
        let mut due = Vec::new();
        let mut next_alarm: Option<ElapsedTimestamp> = None;
        let mut pruned = 0;

        receivers.retain(|&tag, registrations| {
            let before = registrations.len();
            registrations.retain(|r| r.receiver.strong_count() > 0);
            pruned += before - registrations.len();

            let mut tag_due = Vec::new();
            for registration in registrations.iter_mut() {
                if registration.next_pull <= timestamp {
                    if let Some(receiver) = registration.receiver.upgrade() {
                        tag_due.push(receiver);
                    }
                    registration.advance(timestamp);
                }

                next_alarm = Some(match next_alarm {
                    Some(next) => next.min(registration.next_pull),
                    None => registration.next_pull,
                });
            }

            if !tag_due.is_empty() {
                due.push((tag, tag_due));
            }

            !registrations.is_empty()
        });

        if pruned > 0 {
            metric!(counter(PullCounters::ReceiverPruned) += pruned as i64);
        }

        (due, next_alarm)
    }

    /// Frees the samples of all caches and forgets their last pull times.
    ///
    /// Returns the total number of freed samples.
    pub fn force_clear_cache(&self) -> usize {
        let cleared = self.caches.values().map(|c| c.clear_cache()).sum::<usize>();
        metric!(
            counter(PullCounters::CacheCleared) += cleared as i64,
            kind = "forced"
        );
        cleared
    }

    /// Frees stale samples of all caches.
    ///
    /// Sweeps run at most once per configured sweep interval, calls in between do nothing. Returns
    /// the total number of freed samples.
    pub fn clear_cache_if_necessary(&self, timestamp: ElapsedTimestamp) -> usize {
        let mut last_sweep = self.last_sweep.lock();
        if let Some(last) = *last_sweep {
            if timestamp - last < self.config.cache_sweep_interval() {
                return 0;
            }
        }
        *last_sweep = Some(timestamp);

        let cleared = self
            .caches
            .values()
            .map(|c| c.clear_cache_if_necessary(timestamp))
            .sum::<usize>();

        vstat_log::trace!(cleared, "swept stale pull caches");
        metric!(
            counter(PullCounters::CacheCleared) += cleared as i64,
            kind = "sweep"
        );
        cleared
    }
}
