use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use vstat_common::{
    ElapsedTimestamp, FieldValue, NoopGuardrailStats, Sample, TagId, WallClockTimestamp,
};
use vstat_metrics::{AggregationEngine, Collaborators, SampleReceiver, ValueMetricConfig};
use vstat_pull::{PullError, Puller};

const TAG: TagId = 10_000;

/// Generates samples with a dimension field and a value field.
struct SampleGenerator {
    dimensions: i64,
    rng: SmallRng,
}

impl SampleGenerator {
    fn new(dimensions: i64) -> Self {
        Self {
            dimensions,
            rng: SmallRng::seed_from_u64(dimensions as u64),
        }
    }

    fn sample(&mut self, elapsed: ElapsedTimestamp, value: i64) -> Sample {
        let key = self.rng.random_range(0..self.dimensions);
        Sample::new(
            TAG,
            elapsed,
            WallClockTimestamp::default(),
            vec![FieldValue::Int(key), FieldValue::Int(value)],
        )
    }

    /// A batch of pushed samples spread over one hour.
    fn pushed(&mut self, count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| {
                let elapsed = ElapsedTimestamp::from_millis(i as u64 * 3_600_000 / count as u64);
                let value = self.rng.random_range(0..1000);
                self.sample(elapsed, value)
            })
            .collect()
    }

    /// A snapshot with one growing counter per dimension.
    fn snapshot(&mut self, level: i64) -> Vec<Sample> {
        (0..self.dimensions)
            .map(|key| {
                let value = level + self.rng.random_range(0..100);
                Sample::new(
                    TAG,
                    ElapsedTimestamp::ZERO,
                    WallClockTimestamp::default(),
                    vec![FieldValue::Int(key), FieldValue::Int(value)],
                )
            })
            .collect()
    }
}

struct EmptyPuller;

impl Puller for EmptyPuller {
    fn pull(&self, _timestamp: ElapsedTimestamp) -> Result<Arc<[Sample]>, PullError> {
        Ok(Arc::from(Vec::new()))
    }
}

fn config(pulled: bool) -> ValueMetricConfig {
    ValueMetricConfig {
        id: 1,
        pull_tag: pulled.then_some(TAG),
        dimensions: vec![1],
        values: vec![2],
        bucket_size_ms: 60_000,
        dimension_soft_limit: 5_000,
        dimension_hard_limit: 10_000,
        ..Default::default()
    }
}

fn engine(pulled: bool) -> AggregationEngine {
    let puller: Option<Arc<dyn Puller>> = match pulled {
        true => Some(Arc::new(EmptyPuller)),
        false => None,
    };

    let result = AggregationEngine::new(
        config(pulled),
        ElapsedTimestamp::ZERO,
        ElapsedTimestamp::ZERO,
        Collaborators {
            puller,
            stats: Arc::new(NoopGuardrailStats),
            ..Default::default()
        },
    );

    match result {
        Ok(engine) => engine,
        Err(error) => panic!("invalid bench config: {error}"),
    }
}

fn bench_pushed(c: &mut Criterion) {
    let mut group = c.benchmark_group("pushed");

    for dimensions in [10, 1_000] {
        let mut generator = SampleGenerator::new(dimensions);
        let samples = generator.pushed(10_000);

        group.bench_with_input(
            BenchmarkId::new("on_samples", dimensions),
            &samples,
            |b, samples| {
                b.iter_batched(
                    || engine(false),
                    |engine| {
                        engine.on_samples(black_box(samples));
                        engine
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

fn bench_pulled(c: &mut Criterion) {
    let mut group = c.benchmark_group("pulled");

    for dimensions in [10, 1_000] {
        let mut generator = SampleGenerator::new(dimensions);
        let snapshots = (0..60)
            .map(|i| generator.snapshot(i * 1_000))
            .collect::<Vec<_>>();

        group.bench_with_input(
            BenchmarkId::new("on_samples", dimensions),
            &snapshots,
            |b, snapshots| {
                b.iter_batched(
                    || engine(true),
                    |engine| {
                        for snapshot in snapshots {
                            engine.on_samples(black_box(snapshot));
                        }
                        engine
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

fn bench_dump_report(c: &mut Criterion) {
    let mut generator = SampleGenerator::new(1_000);
    let samples = generator.pushed(10_000);

    c.bench_function("dump_report", |b| {
        b.iter_batched(
            || {
                let engine = engine(false);
                engine.on_samples(&samples);
                engine
            },
            |engine| engine.dump_report(ElapsedTimestamp::from_secs(7_200), true, true),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_pushed, bench_pulled, bench_dump_report);
criterion_main!(benches);
