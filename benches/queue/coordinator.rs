use criterion::{BenchmarkId, Criterion};
use orderqueue_rs::{MemoryStore, QueueCoordinator};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

fn runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime")
}

/// Register benchmarks for coordinator operations over the in-memory store.
pub fn register_benchmarks(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("QueueCoordinator");

    for &count in &[100u64, 1_000] {
        group.bench_with_input(BenchmarkId::new("add_to_queue", count), &count, |b, &count| {
            b.iter_with_setup(
                || QueueCoordinator::new(Arc::new(MemoryStore::new())),
                |queue| {
                    runtime.block_on(async {
                        for order_id in 1..=count {
                            let _ = black_box(queue.add_to_queue(order_id, 1).await);
                        }
                    });
                },
            );
        });

        let queue = QueueCoordinator::new(Arc::new(MemoryStore::new()));
        runtime.block_on(async {
            for order_id in 1..=count {
                let _ = queue.add_to_queue(order_id, 1).await;
            }
        });

        group.bench_with_input(BenchmarkId::new("get_active_queue", count), &count, |b, _| {
            b.iter(|| runtime.block_on(async { black_box(queue.get_active_queue().await) }))
        });

        group.bench_with_input(BenchmarkId::new("get_queue_item_tail", count), &count, |b, &tail| {
            b.iter(|| runtime.block_on(async { black_box(queue.get_queue_item(tail).await) }))
        });

        group.bench_with_input(BenchmarkId::new("get_queue_stats", count), &count, |b, _| {
            b.iter(|| runtime.block_on(async { black_box(queue.get_queue_stats().await) }))
        });
    }

    group.finish();
}
