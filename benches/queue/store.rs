use criterion::{BenchmarkId, Criterion};
use orderqueue_rs::{MemoryStore, PositionKey, QueueEntry};
use std::hint::black_box;

fn populated(count: u64) -> MemoryStore {
    let store = MemoryStore::new();
    for order_id in 1..=count {
        let queue_number = store.next_sequence_value();
        let _ = store.insert_entry(
            order_id,
            PositionKey::new(1_700_000_000 + order_id / 10, queue_number),
            QueueEntry::new(order_id, 1, queue_number, 0, 0),
        );
    }
    store
}

/// Register benchmarks for the ordered store.
pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("MemoryStore");

    for &count in &[100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("insert", count), &count, |b, &count| {
            b.iter_with_setup(MemoryStore::new, |store| {
                for order_id in 1..=count {
                    let queue_number = store.next_sequence_value();
                    let _ = black_box(store.insert_entry(
                        order_id,
                        PositionKey::new(1_700_000_000, queue_number),
                        QueueEntry::new(order_id, 1, queue_number, 0, 0),
                    ));
                }
            });
        });

        let store = populated(count);
        let tail = count;
        group.bench_with_input(BenchmarkId::new("rank_of_tail", count), &tail, |b, &tail| {
            b.iter(|| black_box(store.rank_of(black_box(tail))))
        });

        group.bench_with_input(BenchmarkId::new("member_ids", count), &count, |b, _| {
            b.iter(|| black_box(store.member_ids()))
        });

        group.bench_with_input(BenchmarkId::new("drain_head", count), &count, |b, &count| {
            b.iter_with_setup(
                || populated(count),
                |store| {
                    for order_id in 1..=count {
                        black_box(store.remove_entry(order_id));
                    }
                },
            );
        });
    }

    group.finish();
}
