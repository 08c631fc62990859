//! Benchmarks for the probe table and the hashed adapters built on it.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::collections::HashMap;
use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use foldhash::fast::FixedState;
use opaque_collections::{Dictionary, RawProbeTable};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const ENTRY_COUNT: u64 = 10_000;

fn filled_dictionary() -> Dictionary<u64, u64, FixedState> {
    let mut dictionary = Dictionary::new().unwrap();

    for key in 0..ENTRY_COUNT {
        dictionary.add(key, key).unwrap();
    }

    dictionary
}

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("raw_probe_table");

    let allocs_op = allocs.operation("add_10k_from_empty");
    group.bench_function("add_10k_from_empty", |b| {
        b.iter_custom(|iters| {
            let mut tables = iter::repeat_with(|| {
                RawProbeTable::builder()
                    .key_size_of::<u64>()
                    .value_size_of::<u64>()
                    .build()
                    .unwrap()
            })
            .take(usize::try_from(iters).unwrap())
            .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for table in &mut tables {
                for key in 0..ENTRY_COUNT {
                    let bytes = key.to_ne_bytes();
                    table.add(black_box(&bytes), black_box(&bytes)).unwrap();
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("get_hit");
    group.bench_function("get_hit", |b| {
        let dictionary = filled_dictionary();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                _ = black_box(dictionary.get(black_box(i % ENTRY_COUNT)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("get_miss");
    group.bench_function("get_miss", |b| {
        let dictionary = filled_dictionary();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                _ = black_box(dictionary.get(black_box(ENTRY_COUNT + i)));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("remove_then_add");
    group.bench_function("remove_then_add", |b| {
        b.iter_custom(|iters| {
            let mut dictionary = filled_dictionary();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                let key = i % ENTRY_COUNT;
                let value = dictionary.remove(black_box(key)).unwrap();
                dictionary.add(key, black_box(value)).unwrap();
            }

            start.elapsed()
        });
    });

    group.finish();

    // Baseline for the same workload on the standard library map.
    let mut group = c.benchmark_group("std_hash_map");

    let allocs_op = allocs.operation("std_get_hit");
    group.bench_function("get_hit", |b| {
        let map = (0..ENTRY_COUNT)
            .map(|key| (key, key))
            .collect::<HashMap<_, _, FixedState>>();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for i in 0..iters {
                _ = black_box(map.get(&black_box(i % ENTRY_COUNT)));
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
