//! Benchmarks for the slab-backed collections.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::num::NonZero;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use opaque_collections::{List, RawQueue, RawSlab};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const STRIDE: NonZero<usize> = NonZero::new(size_of::<u64>()).unwrap();
const TEST_VALUE: u64 = 1024;

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("raw_slab");

    let allocs_op = allocs.operation("append_10k_from_empty");
    group.bench_function("append_10k_from_empty", |b| {
        b.iter_custom(|iters| {
            let mut slabs = iter::repeat_with(|| RawSlab::new(STRIDE, 1).unwrap())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for slab in &mut slabs {
                for _ in 0..10_000 {
                    slab.append(black_box(&TEST_VALUE.to_ne_bytes())).unwrap();
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("append_range_10k");
    group.bench_function("append_range_10k", |b| {
        let values = vec![TEST_VALUE; 10_000];

        b.iter_custom(|iters| {
            let mut lists = iter::repeat_with(|| List::<u64>::new().unwrap())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for list in &mut lists {
                list.extend_from_slice(black_box(&values)).unwrap();
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("insert_front_1k");
    group.bench_function("insert_front_1k", |b| {
        b.iter_custom(|iters| {
            let mut lists = iter::repeat_with(|| List::<u64>::with_capacity(1024).unwrap())
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for list in &mut lists {
                for _ in 0..1_000 {
                    list.insert(0, black_box(TEST_VALUE)).unwrap();
                }
            }

            start.elapsed()
        });
    });

    group.finish();

    let mut group = c.benchmark_group("raw_queue");

    let allocs_op = allocs.operation("enqueue_dequeue_steady_state");
    group.bench_function("enqueue_dequeue_steady_state", |b| {
        b.iter_custom(|iters| {
            let mut queue = RawQueue::new(STRIDE, 16).unwrap();

            for _ in 0..8 {
                queue.enqueue(&TEST_VALUE.to_ne_bytes()).unwrap();
            }

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                queue.enqueue(black_box(&TEST_VALUE.to_ne_bytes())).unwrap();
                _ = black_box(queue.dequeue().unwrap());
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
