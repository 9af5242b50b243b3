//! Changeset apply benchmarks.

use changemerge_bench::{cascade_delete_changeset, insert_changeset, seeded_briefcase};
use changemerge_changeset::{ChangeRecord, ConflictCause, ConflictOccurrence};
use changemerge_engine::{
    classify, decide, ConflictResolver, LocalDirtyState, MergeConfig, MergeSession, NullSink,
    DEFAULT_METADATA_TABLE_PREFIX,
};
use changemerge_testkit::{element, new_briefcase};
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::sync::Arc;

/// Benchmark applying inserts to an empty briefcase.
fn bench_clean_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("clean_apply");

    for count in [100, 1000].iter() {
        let changeset = insert_changeset("", *count, 2);
        group.throughput(Throughput::Elements(changeset.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &changeset, |b, changeset| {
            b.iter_batched(
                new_briefcase,
                |mut db| {
                    let outcome = MergeSession::new(&mut db, MergeConfig::default())
                        .pull(std::slice::from_ref(changeset));
                    assert!(outcome.is_success());
                    db
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark a changeset where every insert collides with an existing row.
fn bench_key_collisions(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_collisions");

    for count in [100, 1000].iter() {
        let seed = insert_changeset("", *count, 0);
        let colliding = insert_changeset(&seed.id, *count, 0);
        let resolver = ConflictResolver::new().with_sink(Arc::new(NullSink));

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &colliding, |b, colliding| {
            b.iter_batched(
                || seeded_briefcase(&seed),
                |mut db| {
                    let outcome = MergeSession::new(&mut db, MergeConfig::default())
                        .with_resolver(resolver.clone())
                        .pull(std::slice::from_ref(colliding));
                    assert_eq!(outcome.stats.replaced, colliding.len());
                    db
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark deletes whose cascaded records arrive after the cascade already ran.
fn bench_cascade_artifacts(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade_artifacts");

    for count in [100, 1000].iter() {
        let seed = insert_changeset("", *count, 3);
        let deletes = cascade_delete_changeset(&seed);

        group.throughput(Throughput::Elements(deletes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &deletes, |b, deletes| {
            b.iter_batched(
                || seeded_briefcase(&seed),
                |mut db| {
                    let outcome = MergeSession::new(&mut db, MergeConfig::default())
                        .pull(std::slice::from_ref(deletes));
                    assert!(outcome.is_success());
                    db
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark classification and the decision table.
fn bench_classify_decide(c: &mut Criterion) {
    let record = ChangeRecord::insert("Element", &[0], element(1, "E1", "label"));
    let occurrence = ConflictOccurrence::new(ConflictCause::Data, &record);
    let state = LocalDirtyState::dirty();

    c.bench_function("classify_decide", |b| {
        b.iter(|| {
            let category = classify(
                black_box(&occurrence),
                state.has_pending_local_changes,
                DEFAULT_METADATA_TABLE_PREFIX,
            );
            black_box(decide(category, &occurrence, &state))
        });
    });
}

criterion_group!(
    benches,
    bench_clean_apply,
    bench_key_collisions,
    bench_cascade_artifacts,
    bench_classify_decide,
);
criterion_main!(benches);
