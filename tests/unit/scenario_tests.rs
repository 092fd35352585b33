use orderqueue_rs::prelude::*;
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;

    fn new_queue() -> QueueCoordinator<MemoryStore> {
        QueueCoordinator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn canteen_morning_rush() {
        let queue = new_queue();

        for (order_id, user_id) in [(1001, 5), (1002, 6), (1003, 7), (1004, 8)] {
            queue.add_to_queue(order_id, user_id).await.expect("add");
        }
        let stats = queue.get_queue_stats().await.expect("stats");
        assert_eq!(stats.active_orders_count, 4);
        assert_eq!(stats.average_wait_minutes, 20.0);

        queue
            .update_status(1001, "preparing")
            .await
            .expect("preparing");
        queue.update_status(1001, "ready").await.expect("ready");
        queue
            .update_status(1002, "preparing")
            .await
            .expect("preparing");

        // Served orders leave the queue and everyone behind moves up.
        queue.remove_from_queue(1001).await.expect("remove");
        let active = queue.get_active_queue().await.expect("active");
        let view: Vec<(u64, u64, u32, QueueStatus)> = active
            .iter()
            .map(|entry| {
                (
                    entry.order_id,
                    entry.queue_number,
                    entry.estimated_wait_minutes,
                    entry.status,
                )
            })
            .collect();
        assert_eq!(
            view,
            vec![
                (1002, 2, 0, QueueStatus::Preparing),
                (1003, 3, 5, QueueStatus::Waiting),
                (1004, 4, 10, QueueStatus::Waiting),
            ]
        );

        let next = queue.add_to_queue(1005, 9).await.expect("add");
        assert_eq!(next.queue_number, 5);
        assert_eq!(next.estimated_wait_minutes, 15);

        let stats = queue.get_queue_stats().await.expect("stats");
        assert_eq!(stats.active_orders_count, 4);
        assert_eq!(stats.total_orders_today, 5);
    }

    #[tokio::test]
    async fn entry_and_stats_wire_format() {
        let queue = new_queue();
        let entry = queue.add_to_queue(1001, 5).await.expect("add");

        let json = serde_json::to_value(&entry).expect("entry json");
        assert_eq!(json["order_id"], 1001);
        assert_eq!(json["user_id"], 5);
        assert_eq!(json["queue_number"], 1);
        assert_eq!(json["estimated_wait_time"], 0);
        assert_eq!(json["status"], "waiting");
        assert!(json["created_at"].as_u64().is_some());

        let stats = queue.get_queue_stats().await.expect("stats");
        let json = serde_json::to_value(stats).expect("stats json");
        assert_eq!(json["total_orders_today"], 1);
        assert_eq!(json["average_wait_time"], 5.0);
        assert_eq!(json["active_orders_count"], 1);
    }

    #[tokio::test]
    async fn errors_map_to_request_failures() {
        let queue = new_queue();

        let not_found = queue.get_queue_item(1).await.expect_err("missing");
        assert_eq!(not_found.to_string(), "queue entry not found: order 1");
        assert!(!not_found.is_retryable());

        let bad_status = queue.update_status(1, "lost").await.expect_err("bad status");
        assert!(matches!(bad_status, QueueError::InvalidStatus { .. }));

        let bad_id = queue.add_to_queue(0, 1).await.expect_err("bad id");
        assert!(matches!(bad_id, QueueError::InvalidInput { .. }));
    }
}
