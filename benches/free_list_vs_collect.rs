use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use sweepheap::MarkSweepHeap;

fn churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_release");
    for size in [8usize, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut heap = MarkSweepHeap::default().with_root_capacity(usize::MAX);
            b.iter(|| {
                let ptr = heap.allocate(black_box(size)).unwrap();
                heap.release(ptr.as_ptr()).unwrap();
                heap.pop_root().unwrap();
            });
        });
    }
    group.finish();
}

fn collect_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");
    for objects in [16usize, 128, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(objects),
            &objects,
            |b, &objects| {
                b.iter(|| {
                    let mut heap = MarkSweepHeap::default();
                    for i in 0..objects {
                        heap.allocate(8 + (i % 4) * 16).unwrap();
                    }
                    for _ in 0..objects / 2 {
                        heap.pop_root().unwrap();
                    }
                    black_box(heap.collect().unwrap())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, churn, collect_cycle);
criterion_main!(benches);
