//! Performance benchmarks for rill-state propagation.
//!
//! Run with: cargo bench --package rill-state

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rill_state::{graft, keyed, pluck, root, Key, Path, Trace};
use serde_json::{json, Value};

/// Generate a sequence of keyed items.
fn generate_items(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| json!({"id": i, "name": format!("item_{}", i)}))
            .collect(),
    )
}

/// Generate a deeply nested document and the trace addressing its leaf.
fn generate_nested_doc(depth: usize) -> (Value, Trace) {
    let mut current = json!({"value": 42});
    let mut keys = vec![Key::field("value")];
    for i in (0..depth).rev() {
        let field = format!("level_{}", i);
        let mut obj = serde_json::Map::new();
        obj.insert(field.clone(), current);
        current = Value::Object(obj);
        keys.insert(0, Key::field(field));
    }
    let path: Path = keys.into_iter().collect();
    let trace = Trace::from_path(&path).unwrap();
    (current, trace)
}

fn bench_pluck(c: &mut Criterion) {
    let mut group = c.benchmark_group("pluck");
    for depth in [4, 16, 64] {
        let (doc, trace) = generate_nested_doc(depth);
        let path = trace.to_path();
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(pluck(&doc, &path)));
        });
    }
    group.finish();
}

fn bench_graft(c: &mut Criterion) {
    let mut group = c.benchmark_group("graft");
    for depth in [4, 16, 64] {
        let (doc, trace) = generate_nested_doc(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(graft(&doc, Some(&trace), json!(7)).unwrap()));
        });
    }
    group.finish();
}

fn bench_keyed_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_diff");
    for size in [10, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let tree = root(generate_items(size));
                    let view = keyed(tree.clone(), |item| item["id"].clone());
                    let _sub = view.changes().subscribe(|c| {
                        black_box(c.moves.len());
                    });
                    // Reverse the sequence: every item moves.
                    let mut items = tree.get().unwrap().unwrap().as_array().unwrap().clone();
                    items.reverse();
                    (tree, view, Value::Array(items))
                },
                |(tree, _view, reversed)| tree.set(reversed),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscriber_fanout");
    for subscribers in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let tree = root(json!({"hot": 0, "cold": {"a": 1}}));
                let mut subs = Vec::new();
                for _ in 0..subscribers {
                    subs.push(tree.sub("hot").subscribe(|v| {
                        black_box(v);
                    }));
                }
                let hot = tree.sub("hot");
                let mut n = 0i64;
                b.iter(|| {
                    n += 1;
                    hot.set(json!(n));
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_pluck,
    bench_graft,
    bench_keyed_diff,
    bench_fanout
);
criterion_main!(benches);
