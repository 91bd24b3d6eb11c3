//! Benchmarks for ripple-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{Container, Data, Runtime, Value};

fn counter_state(runtime: &Runtime) -> Container {
    runtime.wrap(&Data::from_fields([("count", 0)]))
}

// =============================================================================
// CONTAINER BENCHMARKS
// =============================================================================

fn bench_container_get_untracked(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = counter_state(&runtime);
    c.bench_function("container_get_untracked", |b| {
        b.iter(|| black_box(state.get("count").unwrap()))
    });
}

fn bench_container_set(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = counter_state(&runtime);
    let mut n = 0;
    c.bench_function("container_set", |b| {
        b.iter(|| {
            n += 1;
            state.set("count", black_box(n)).unwrap()
        })
    });
}

fn bench_container_set_same_value(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = counter_state(&runtime);
    c.bench_function("container_set_same_value", |b| {
        b.iter(|| state.set("count", black_box(0)).unwrap())
    });
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_get_cached(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = counter_state(&runtime);
    state
        .define_computed("double", |s| {
            Ok(Value::from(s.get("count")?.as_f64().unwrap_or_default() * 2.0))
        })
        .unwrap();
    let _ = state.get("double");

    c.bench_function("computed_get_cached", |b| {
        b.iter(|| black_box(state.get("double").unwrap()))
    });
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");
    for depth in [1usize, 10, 50] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let runtime = Runtime::new();
            let state = counter_state(&runtime);
            let mut previous = String::from("count");
            for level in 0..depth {
                let key = format!("level{level}");
                let source = previous.clone();
                state
                    .define_computed(key.as_str(), move |s| {
                        Ok(Value::from(s.get(source.as_str())?.as_f64().unwrap_or_default() + 1.0))
                    })
                    .unwrap();
                previous = key;
            }
            let mut n = 0;
            b.iter(|| {
                n += 1;
                state.set("count", n).unwrap();
                black_box(state.get(previous.as_str()).unwrap())
            })
        });
    }
    group.finish();
}

// =============================================================================
// REACTION BENCHMARKS
// =============================================================================

fn bench_reaction_trigger(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = counter_state(&runtime);
    let _reaction = runtime
        .reaction({
            let state = state.clone();
            move || {
                black_box(state.get("count")?);
                Ok(())
            }
        })
        .unwrap();

    let mut n = 0;
    c.bench_function("reaction_trigger", |b| {
        b.iter(|| {
            n += 1;
            state.set("count", n).unwrap()
        })
    });
}

fn bench_batch_updates(c: &mut Criterion) {
    let runtime = Runtime::new();
    let state = counter_state(&runtime);
    let _reaction = runtime
        .reaction({
            let state = state.clone();
            move || {
                black_box(state.get("count")?);
                Ok(())
            }
        })
        .unwrap();

    let mut n = 0;
    c.bench_function("batch_100_writes", |b| {
        b.iter(|| {
            runtime
                .batch(|| {
                    for _ in 0..100 {
                        n += 1;
                        state.set("count", n).unwrap();
                    }
                })
                .unwrap()
        })
    });
}

// =============================================================================
// STRESS BENCHMARKS
// =============================================================================

fn bench_many_reactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_reactions");
    for count in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("trigger", count), &count, |b, &count| {
            let runtime = Runtime::new();
            let state = counter_state(&runtime);
            let _reactions: Vec<_> = (0..count)
                .map(|_| {
                    let state = state.clone();
                    runtime
                        .reaction(move || {
                            black_box(state.get("count")?);
                            Ok(())
                        })
                        .unwrap()
                })
                .collect();

            let mut n = 0;
            b.iter(|| {
                n += 1;
                state.set("count", n).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_list_push(c: &mut Criterion) {
    let runtime = Runtime::new();
    let list = runtime.wrap(&Data::list());
    let _reaction = runtime
        .reaction({
            let list = list.clone();
            move || {
                black_box(list.len());
                Ok(())
            }
        })
        .unwrap();

    c.bench_function("list_push_tracked_len", |b| {
        b.iter(|| list.push(black_box(1)).unwrap())
    });
}

criterion_group!(
    container_benches,
    bench_container_get_untracked,
    bench_container_set,
    bench_container_set_same_value,
);

criterion_group!(computed_benches, bench_computed_get_cached, bench_computed_chain);

criterion_group!(reaction_benches, bench_reaction_trigger, bench_batch_updates);

criterion_group!(stress_benches, bench_many_reactions, bench_list_push);

criterion_main!(container_benches, computed_benches, reaction_benches, stress_benches);
