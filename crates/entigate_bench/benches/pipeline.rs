//! Mutation pipeline benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entigate_model::{Fields, Value, Version};
use entigate_testkit::{post_payload, user, TestPipeline};
use rand::Rng;

fn random_title() -> Fields {
    let mut rng = rand::thread_rng();
    let mut patch = Fields::new();
    patch.insert("title".into(), Value::Text(format!("t{}", rng.gen::<u32>())));
    patch
}

/// Benchmark inserts into a growing store.
fn bench_insert(c: &mut Criterion) {
    let harness = TestPipeline::new();
    let alice = user("alice");

    c.bench_function("insert", |b| {
        b.iter(|| black_box(harness.insert(&alice, "post", post_payload("alice"))));
    });
}

/// Benchmark a chain of updates to one resource.
fn bench_update_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_chain");

    for length in [10usize, 100].iter() {
        group.throughput(Throughput::Elements(*length as u64));
        group.bench_with_input(BenchmarkId::from_parameter(length), length, |b, &length| {
            let alice = user("alice");
            b.iter(|| {
                let harness = TestPipeline::new();
                let Ok(mut current) = harness.insert(&alice, "post", post_payload("alice")) else {
                    return;
                };
                for _ in 0..length {
                    match harness.update(&alice, "post", current.id, random_title(), current.version) {
                        Ok(next) => current = next,
                        Err(_) => break,
                    }
                }
                black_box(current.version);
            });
        });
    }

    group.finish();
}

/// Benchmark rolling back over a long history.
fn bench_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollback");

    for depth in [10usize, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let harness = TestPipeline::new();
            let alice = user("alice");
            let Ok(mut current) = harness.insert(&alice, "post", post_payload("alice")) else {
                return;
            };
            for _ in 0..depth {
                if let Ok(next) = harness.update(&alice, "post", current.id, random_title(), current.version) {
                    current = next;
                }
            }
            let id = current.id;
            b.iter(|| black_box(harness.rollback(&alice, "post", id, Version::INITIAL)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_update_chain, bench_rollback);
criterion_main!(benches);
