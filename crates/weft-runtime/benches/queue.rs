//! Run-queue benchmarks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use weft_runtime::{RunQueue, ThreadPool, WorkItem};

fn wait_for(counter: &AtomicUsize, target: usize) {
    while counter.load(Ordering::Acquire) < target {
        std::hint::spin_loop();
    }
}

fn bench_enqueue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_drain");
    for &count in &[1_000usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let dispatcher = Arc::new(ThreadPool::new());
            b.iter(|| {
                let queue = RunQueue::new(Arc::clone(&dispatcher));
                let done = Arc::new(AtomicUsize::new(0));
                for _ in 0..count {
                    let done = Arc::clone(&done);
                    queue
                        .enqueue(WorkItem::new(move || {
                            done.fetch_add(1, Ordering::Release);
                        }))
                        .unwrap();
                }
                wait_for(&done, count);
            });
        });
    }
    group.finish();
}

fn bench_stopped_enqueue(c: &mut Criterion) {
    c.bench_function("stopped_enqueue", |b| {
        let dispatcher = Arc::new(ThreadPool::new());
        let queue = RunQueue::new(dispatcher);
        queue.stop();
        b.iter(|| {
            queue.enqueue(WorkItem::new(|| {})).unwrap();
        });
    });
}

criterion_group!(benches, bench_enqueue_drain, bench_stopped_enqueue);
criterion_main!(benches);
