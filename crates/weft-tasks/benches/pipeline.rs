//! Task composition benchmarks.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use weft_runtime::{RunQueue, ThreadPool};
use weft_tasks::{repeat, sequence, Task};

fn bench_pipeline_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_depth");
    for &depth in &[10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let pool = Arc::new(ThreadPool::new());
            let queue = RunQueue::new(pool);
            let increment = Task::leaf(&queue, |x: i64| x + 1);
            let pipeline = sequence(vec![increment; depth]).unwrap();
            b.iter(|| {
                assert_eq!(pipeline.run(0).join().unwrap(), depth as i64);
            });
        });
    }
    group.finish();
}

fn bench_repeat(c: &mut Criterion) {
    c.bench_function("repeat_1000", |b| {
        let pool = Arc::new(ThreadPool::new());
        let queue = RunQueue::new(pool);
        let child = Task::leaf(&queue, |i: usize| i);
        let repeated = repeat(child);
        b.iter(|| {
            assert_eq!(repeated.run(1_000).join().unwrap(), 999);
        });
    });
}

criterion_group!(benches, bench_pipeline_depth, bench_repeat);
criterion_main!(benches);
