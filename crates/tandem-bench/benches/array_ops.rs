//! Criterion micro-benchmarks for array allocation, migration, and
//! element access.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_array::ManagedArray;
use tandem_bench::bench_registry;
use tandem_core::MemorySpace;

/// Allocate and free a host array at several sizes.
fn bench_allocate_free(c: &mut Criterion) {
    let registry = bench_registry();
    for elems in [64usize, 4096, 262_144] {
        c.bench_function(&format!("array_allocate_free_{elems}"), |b| {
            b.iter(|| {
                let mut array =
                    ManagedArray::<i32>::with_size(elems, MemorySpace::Host, &registry).unwrap();
                black_box(array.size());
                array.free();
            });
        });
    }
}

/// Round-trip migration: force the bytes to the device, then back.
/// Both mirror buffers exist after the first iteration, so the steady
/// state measures two copies per iteration and no allocation.
fn bench_migrate_round_trip(c: &mut Criterion) {
    let registry = bench_registry();
    for elems in [64usize, 4096, 262_144] {
        let mut array =
            ManagedArray::<i32>::with_size(elems, MemorySpace::Host, &registry).unwrap();
        c.bench_function(&format!("array_migrate_round_trip_{elems}"), |b| {
            b.iter(|| {
                let dev = array.device_view().unwrap();
                black_box(dev);
                let host = array.host_view().unwrap();
                black_box(host);
            });
        });
        array.free();
    }
}

/// The no-copy fast path: repeated same-side residency checks.
fn bench_resident_touch(c: &mut Criterion) {
    let registry = bench_registry();
    let mut array = ManagedArray::<i32>::with_size(4096, MemorySpace::Host, &registry).unwrap();

    c.bench_function("array_resident_touch_4096", |b| {
        b.iter(|| {
            let host = array.host_view().unwrap();
            black_box(host);
        });
    });
    array.free();
}

/// Unchecked indexing over 10K resident elements.
fn bench_index_sum(c: &mut Criterion) {
    let registry = bench_registry();
    let mut array = ManagedArray::<i64>::with_size(10_000, MemorySpace::Host, &registry).unwrap();
    for i in 0..10_000 {
        array.set(i, i as i64);
    }

    c.bench_function("array_index_sum_10k", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for i in 0..10_000 {
                sum += array[i];
            }
            black_box(sum);
        });
    });
    array.free();
}

/// Single-element host access with the tracker consulted each time.
fn bench_pick_set(c: &mut Criterion) {
    let registry = bench_registry();
    let mut array = ManagedArray::<i32>::with_size(1024, MemorySpace::Host, &registry).unwrap();

    c.bench_function("array_pick_set_host", |b| {
        b.iter(|| {
            array.set(7, 41);
            black_box(array.pick(7));
        });
    });
    array.free();
}

criterion_group!(
    benches,
    bench_allocate_free,
    bench_migrate_round_trip,
    bench_resident_touch,
    bench_index_sum,
    bench_pick_set,
);
criterion_main!(benches);
