use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use vstat_common::{
    Clock, DimensionKey, ElapsedTimestamp, FieldValue, GuardrailRecorder, ManualClock, Sample,
    TagId, Value, WallClockTimestamp,
};
use vstat_metrics::{AggregationEngine, Collaborators, LifecycleListener, ValueMetricConfig};
use vstat_pull::{
    DataSource, FetchError, IsolatedUidMap, PullConfig, PullDataReceiver, PullManager, Puller,
};

const TAG: TagId = 10_000;
const APP_UID: i64 = 1000;
const OTHER_UID: i64 = 2000;
const ISOLATED_UID: i64 = 99_001;

fn secs(secs: u64) -> ElapsedTimestamp {
    ElapsedTimestamp::from_secs(secs)
}

fn uid(uid: i64) -> DimensionKey {
    DimensionKey::new([FieldValue::Int(uid)])
}

/// A CPU time counter per UID.
///
/// The isolated process of the app contributes a constant 5 on top of the app's counter.
fn cpu_time_source(level: Arc<AtomicI64>) -> Arc<dyn DataSource> {
    Arc::new(move |tag: TagId| -> Result<Vec<Sample>, FetchError> {
        let level = level.load(Ordering::SeqCst);
        let sample = |uid: i64, value: i64| {
            Sample::new(
                tag,
                ElapsedTimestamp::ZERO,
                WallClockTimestamp::default(),
                vec![FieldValue::Int(uid), FieldValue::Int(value)],
            )
        };

        Ok(vec![
            sample(APP_UID, level),
            sample(ISOLATED_UID, 5),
            sample(OTHER_UID, level * 2),
        ])
    })
}

struct Setup {
    manager: PullManager,
    clock: Arc<ManualClock>,
    stats: Arc<GuardrailRecorder>,
    level: Arc<AtomicI64>,
}

fn setup() -> Setup {
    let config: PullConfig = serde_json::from_str(
        r#"{
            "default_cooldown_ms": 500,
            "tags": {
                "10000": {
                    "cooldown_ms": 1000,
                    "uid_field": 1,
                    "additive_fields": [2]
                }
            }
        }"#,
    )
    .unwrap();

    let uids = Arc::new(IsolatedUidMap::new());
    uids.insert(ISOLATED_UID as i32, APP_UID as i32);

    let clock = Arc::new(ManualClock::default());
    let stats = Arc::new(GuardrailRecorder::new());
    let level = Arc::new(AtomicI64::new(100));

    let mut manager = PullManager::new(config, uids, clock.clone(), stats.clone());
    manager.register_source(TAG, cpu_time_source(level.clone()));

    Setup {
        manager,
        clock,
        stats,
        level,
    }
}

fn metric_config(id: i64, dimensions: Vec<usize>) -> ValueMetricConfig {
    let mut config: ValueMetricConfig = serde_json::from_str(
        r#"{
            "pull_tag": 10000,
            "values": [2],
            "bucket_size_ms": 60000
        }"#,
    )
    .unwrap();

    config.id = id;
    config.dimensions = dimensions;
    config
}

fn pulled_engine(setup: &Setup, config: ValueMetricConfig) -> Arc<AggregationEngine> {
    let puller: Arc<dyn Puller> = setup.manager.puller(TAG).unwrap();
    let engine = AggregationEngine::new(
        config,
        ElapsedTimestamp::ZERO,
        setup.clock.elapsed_now(),
        Collaborators {
            puller: Some(puller),
            stats: setup.stats.clone(),
            ..Default::default()
        },
    )
    .unwrap();

    let engine = Arc::new(engine);
    let receiver: Arc<dyn PullDataReceiver> = engine.clone();
    setup
        .manager
        .register_receiver(
            TAG,
            Arc::downgrade(&receiver),
            engine.current_bucket_end(),
            Duration::from_secs(60),
        )
        .unwrap();

    engine
}

fn fire_alarm(setup: &Setup, at: ElapsedTimestamp, level: i64) -> Option<ElapsedTimestamp> {
    setup.level.store(level, Ordering::SeqCst);
    setup.clock.set(at);
    setup.manager.on_alarm_fired(at)
}

#[test]
fn test_scheduled_pulls_report_diffs_per_uid() {
    vstat_log::init_test!();
    let setup = setup();
    let engine = pulled_engine(&setup, metric_config(1, vec![1]));

    assert_eq!(fire_alarm(&setup, secs(60), 130), Some(secs(120)));
    assert_eq!(fire_alarm(&setup, secs(120), 200), Some(secs(180)));

    let report = engine.dump_report(secs(120), false, true);
    assert_eq!(report.metric_id, 1);

    let values = |key: &DimensionKey| -> Vec<Value> {
        report
            .buckets(key)
            .iter()
            .map(|bucket| bucket.values[0].value)
            .collect()
    };

    // The isolated UID is merged into its host, so it never shows up as its own dimension.
    similar_asserts::assert_eq!(values(&uid(APP_UID)), [Value::Long(30), Value::Long(70)]);
    similar_asserts::assert_eq!(values(&uid(OTHER_UID)), [Value::Long(60), Value::Long(140)]);
    assert!(report.buckets(&uid(ISOLATED_UID)).is_empty());

    let pull_stats = setup.stats.pull_stats(TAG);
    assert_eq!(pull_stats.fetches, 3);
    assert_eq!(pull_stats.min_pull_interval, Some(Duration::from_secs(60)));
}

#[test]
fn test_metrics_share_one_pull() {
    let setup = setup();
    let first = pulled_engine(&setup, metric_config(1, vec![1]));
    let second = pulled_engine(&setup, metric_config(2, vec![1]));

    // The second engine established its base from the cache.
    let pull_stats = setup.stats.pull_stats(TAG);
    assert_eq!(pull_stats.pulls, 2);
    assert_eq!(pull_stats.cache_hits, 1);
    assert_eq!(pull_stats.fetches, 1);

    fire_alarm(&setup, secs(60), 130);
    assert_eq!(setup.stats.pull_stats(TAG).fetches, 2);

    let first = first.dump_report(secs(60), false, true);
    let second = second.dump_report(secs(60), false, true);
    assert_eq!(first.dimensions.len(), 2);
    similar_asserts::assert_eq!(first.dimensions, second.dimensions);
}

#[test]
fn test_condition_change_within_cooldown_uses_cache() {
    let setup = setup();
    let config = ValueMetricConfig {
        condition: Some(3),
        ..metric_config(1, vec![1])
    };
    let engine = pulled_engine(&setup, config);
    assert_eq!(setup.stats.pull_stats(TAG).pulls, 0);

    setup.clock.set(secs(10));
    engine.on_condition_changed(true, secs(10));

    // Half a second later the counter moved, but the cached snapshot is reused.
    setup.level.store(120, Ordering::SeqCst);
    setup.clock.set(secs(10) + Duration::from_millis(500));
    engine.on_condition_changed(false, secs(10) + Duration::from_millis(500));

    let pull_stats = setup.stats.pull_stats(TAG);
    assert_eq!(pull_stats.fetches, 1);
    assert_eq!(pull_stats.cache_hits, 1);

    // A zero diff is not reported.
    let report = engine.dump_report(secs(60), false, true);
    assert!(report.dimensions.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn test_dropped_engine_stops_pulls() {
    let setup = setup();
    let engine = pulled_engine(&setup, metric_config(1, vec![1]));
    drop(engine);

    assert_eq!(fire_alarm(&setup, secs(60), 130), None);
    assert_eq!(setup.stats.pull_stats(TAG).fetches, 1);
}
