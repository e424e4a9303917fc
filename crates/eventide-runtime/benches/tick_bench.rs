//! Benchmarks for root-tick dispatch.
//!
//! Run with: `cargo bench --package eventide-runtime --bench tick_bench`
//!
//! # Performance Baselines
//!
//! - Fan-out: one emission delivered to N listeners
//! - Chains: one emission cascading through N linked registries
//! - Folding: a `ReducedValue` bound to a registry

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use eventide_core::Scope;
use eventide_runtime::{EventRegistry, ReducedValue};

// ============================================================================
// Fan-out
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick/fan_out");
    for listeners in [1_usize, 16, 256] {
        let scope = Scope::detached();
        let registry = EventRegistry::<u64>::named(&scope, "fan_out");
        let sink = Rc::new(Cell::new(0_u64));
        for _ in 0..listeners {
            let sink = Rc::clone(&sink);
            registry.on(move |v| sink.set(sink.get().wrapping_add(*v)));
        }
        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| registry.emit_once(black_box(1)));
        });
        black_box(sink.get());
    }
    group.finish();
}

// ============================================================================
// Link chains
// ============================================================================

fn bench_link_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick/link_chain");
    for depth in [4_usize, 64, 1024] {
        let scope = Scope::detached();
        let registries: Vec<EventRegistry<u64>> = (0..depth)
            .map(|_| EventRegistry::named(&scope, "chain"))
            .collect();
        for pair in registries.windows(2) {
            pair[0].link_to(&pair[1]);
        }
        let hits = Rc::new(Cell::new(0_u64));
        let h = Rc::clone(&hits);
        if let Some(last) = registries.last() {
            last.on(move |_| h.set(h.get() + 1));
        }
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| registries[0].emit_once(black_box(7)));
        });
        black_box(hits.get());
    }
    group.finish();
}

// ============================================================================
// Folding
// ============================================================================

fn bench_reduce(c: &mut Criterion) {
    let scope = Scope::detached();
    let registry = EventRegistry::<u64>::named(&scope, "reduce");
    let total = ReducedValue::builder()
        .add_reducer(&registry, |acc: &u64, v| acc.wrapping_add(*v))
        .build_in(&scope, 0);
    c.bench_function("tick/reduce", |b| {
        b.iter(|| registry.emit_once(black_box(3)));
    });
    black_box(total.value());
}

criterion_group!(benches, bench_fan_out, bench_link_chain, bench_reduce);
criterion_main!(benches);
