#[cfg(test)]
mod tests_concurrency {
    use orderqueue_rs::{MemoryStore, QueueCoordinator, QueueError};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn parallel_adds_never_share_a_queue_number() {
        let queue = Arc::new(QueueCoordinator::new(Arc::new(MemoryStore::new())));
        let mut tasks = JoinSet::new();
        for order_id in 1..=500u64 {
            let queue = Arc::clone(&queue);
            tasks.spawn(async move { queue.add_to_queue(order_id, order_id % 17 + 1).await });
        }

        let mut numbers = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            let entry = joined.expect("task").expect("add");
            assert!(numbers.insert(entry.queue_number), "duplicate queue number");
        }
        assert_eq!(numbers.len(), 500);
        assert_eq!(numbers.iter().max().copied(), Some(500));

        let active = queue.get_active_queue().await.expect("active");
        assert_eq!(active.len(), 500);
        for (rank, entry) in active.iter().enumerate() {
            assert_eq!(entry.estimated_wait_minutes as usize, rank * 5);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn racing_duplicate_adds_yield_one_entry() {
        let queue = Arc::new(QueueCoordinator::new(Arc::new(MemoryStore::new())));
        let mut tasks = JoinSet::new();
        for _ in 0..32 {
            let queue = Arc::clone(&queue);
            tasks.spawn(async move { queue.add_to_queue(42, 7).await });
        }

        let mut numbers = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.expect("task") {
                Ok(entry) => {
                    numbers.insert(entry.queue_number);
                }
                Err(QueueError::AlreadyQueued { order_id }) => assert_eq!(order_id, 42),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(numbers.len(), 1);
        assert_eq!(queue.get_active_queue().await.expect("active").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn mixed_adds_and_removes_stay_consistent() {
        let queue = Arc::new(QueueCoordinator::new(Arc::new(MemoryStore::new())));
        for order_id in 1..=100u64 {
            queue.add_to_queue(order_id, 1).await.expect("seed");
        }

        let mut tasks = JoinSet::new();
        for order_id in 1..=100u64 {
            let queue = Arc::clone(&queue);
            tasks.spawn(async move {
                if order_id % 2 == 0 {
                    queue.remove_from_queue(order_id).await
                } else {
                    queue.add_to_queue(order_id + 1_000, 1).await.map(|_| ())
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.expect("task").expect("operation");
        }

        let active = queue.get_active_queue().await.expect("active");
        assert_eq!(active.len(), 100);
        let stats = queue.get_queue_stats().await.expect("stats");
        assert_eq!(stats.active_orders_count, 100);
        assert!(active.iter().all(|entry| entry.order_id % 2 == 1 || entry.order_id > 1_000));

        // Seeded odd orders keep their head-of-queue positions.
        let head: Vec<u64> = active.iter().take(50).map(|entry| entry.order_id).collect();
        let expected: Vec<u64> = (1..=100).filter(|id| id % 2 == 1).collect();
        assert_eq!(head, expected);
    }
}
