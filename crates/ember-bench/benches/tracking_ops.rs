//! Criterion micro-benchmarks for the emitter tracking table.

use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ember_bench::FixedAnchor;
use ember_engine::EmitterBufferHandler;

fn full_table(capacity: usize) -> EmitterBufferHandler<Rc<FixedAnchor>> {
    let mut handler = EmitterBufferHandler::new(capacity, 0.5);
    for id in 0..capacity as u64 {
        handler.track(Rc::new(FixedAnchor(id)), id as f32);
    }
    handler
}

/// Update transforms of a full 1024-slot table.
fn bench_update_full(c: &mut Criterion) {
    let mut handler = full_table(1024);
    c.bench_function("tracking_update_1024", |b| {
        b.iter(|| {
            handler.update(0.0);
            black_box(handler.upload_range());
        });
    });
}

/// Track one more emitter into a full table, forcing an eviction pass.
fn bench_track_with_eviction(c: &mut Criterion) {
    c.bench_function("tracking_evict_1024", |b| {
        b.iter_batched(
            || full_table(1024),
            |mut handler| {
                black_box(handler.track(Rc::new(FixedAnchor(5000)), 5000.0));
                handler
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_update_full, bench_track_with_eviction);
criterion_main!(benches);
