//! Tests for the event intake dispatch matrix and worker loop

#[cfg(test)]
mod tests {
    use crate::queue::coordinator::QueueCoordinator;
    use crate::queue::intake::{ChannelDelivery, EventIntake, IntakeOutcome, OrderEvent};
    use crate::queue::store::MemoryStore;
    use crate::queue::tests::test_helpers::FaultyStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};

    fn intake() -> EventIntake<MemoryStore> {
        EventIntake::new(Arc::new(QueueCoordinator::new(Arc::new(MemoryStore::new()))))
    }

    fn payload(order_id: u64, user_id: u64, new_status: &str) -> Vec<u8> {
        OrderEvent::new(order_id, user_id, new_status)
            .to_vec()
            .expect("serialize")
    }

    #[tokio::test]
    async fn test_confirmed_adds_to_queue() {
        let intake = intake();
        let outcome = intake.handle_payload(&payload(1001, 5, "confirmed")).await;
        assert_eq!(outcome, IntakeOutcome::Ack);

        let entry = intake
            .coordinator()
            .get_queue_item(1001)
            .await
            .expect("queued");
        assert_eq!(entry.user_id, 5);
        assert_eq!(intake.added(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_confirmed_is_idempotent() {
        let intake = intake();
        let message = payload(1001, 5, "confirmed");

        assert_eq!(intake.handle_payload(&message).await, IntakeOutcome::Ack);
        assert_eq!(intake.handle_payload(&message).await, IntakeOutcome::Ack);

        let active = intake.coordinator().get_active_queue().await.expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].queue_number, 1);
        assert_eq!(intake.coordinator().store().current_sequence(), 1);
    }

    #[tokio::test]
    async fn test_completed_and_cancelled_remove() {
        let intake = intake();
        intake.handle_payload(&payload(1, 1, "confirmed")).await;
        intake.handle_payload(&payload(2, 1, "confirmed")).await;

        assert_eq!(
            intake.handle_payload(&payload(1, 1, "completed")).await,
            IntakeOutcome::Ack
        );
        assert_eq!(
            intake.handle_payload(&payload(2, 1, "cancelled")).await,
            IntakeOutcome::Ack
        );
        assert!(intake.coordinator().get_active_queue().await.expect("active").is_empty());
        assert_eq!(intake.removed(), 2);
    }

    #[tokio::test]
    async fn test_completed_for_unknown_order_acks() {
        let intake = intake();
        assert_eq!(
            intake.handle_payload(&payload(404, 1, "completed")).await,
            IntakeOutcome::Ack
        );
    }

    #[tokio::test]
    async fn test_other_statuses_are_acked_without_action() {
        let intake = intake();
        for status in ["pending", "preparing", "ready", ""] {
            assert_eq!(
                intake.handle_payload(&payload(1, 1, status)).await,
                IntakeOutcome::Ack
            );
        }
        assert!(intake.coordinator().get_active_queue().await.expect("active").is_empty());
        assert_eq!(intake.ignored(), 4);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_discarded() {
        let intake = intake();
        assert_eq!(intake.handle_payload(b"{broken").await, IntakeOutcome::Discard);
        assert_eq!(
            intake.handle_payload(br#"{"new_status":"confirmed"}"#).await,
            IntakeOutcome::Discard
        );
        assert_eq!(intake.discarded(), 2);
        assert_eq!(intake.received(), 2);
    }

    #[tokio::test]
    async fn test_invalid_ids_are_discarded() {
        let intake = intake();
        assert_eq!(
            intake.handle_payload(&payload(1, 0, "confirmed")).await,
            IntakeOutcome::Discard
        );
        assert_eq!(
            intake.handle_payload(&payload(0, 3, "confirmed")).await,
            IntakeOutcome::Discard
        );
    }

    #[tokio::test]
    async fn test_store_failure_on_add_requeues() {
        let store = Arc::new(FaultyStore::new());
        let intake = EventIntake::new(Arc::new(QueueCoordinator::new(Arc::clone(&store))));

        store.fail("next_sequence");
        assert_eq!(
            intake.handle_payload(&payload(1, 1, "confirmed")).await,
            IntakeOutcome::Requeue
        );
        assert_eq!(intake.requeued(), 1);

        store.heal();
        assert_eq!(
            intake.handle_payload(&payload(1, 1, "confirmed")).await,
            IntakeOutcome::Ack
        );
    }

    #[tokio::test]
    async fn test_store_failure_on_remove_still_acks() {
        let store = Arc::new(FaultyStore::new());
        let intake = EventIntake::new(Arc::new(QueueCoordinator::new(Arc::clone(&store))));

        store.fail("remove");
        assert_eq!(
            intake.handle_payload(&payload(1, 1, "cancelled")).await,
            IntakeOutcome::Ack
        );
        assert_eq!(intake.ignored(), 1);
    }

    #[tokio::test]
    async fn test_handle_event_skips_parsing() {
        let intake = intake();
        let event = OrderEvent::new(7, 3, "confirmed");
        assert_eq!(intake.handle_event(&event).await, IntakeOutcome::Ack);
        assert_eq!(intake.received(), 1);
        assert_eq!(intake.added(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_settles_every_delivery() {
        let intake = Arc::new(intake().with_max_in_flight(4));
        let (tx, rx) = mpsc::channel(64);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&intake).run(rx, shutdown_rx));

        let mut outcomes = Vec::new();
        for order_id in 1..=20u64 {
            let (delivery, outcome) = ChannelDelivery::new(payload(order_id, 1, "confirmed"));
            tx.send(delivery).await.expect("send");
            outcomes.push(outcome);
        }
        let (poison, poison_outcome) = ChannelDelivery::new(b"nope".to_vec());
        tx.send(poison).await.expect("send");

        for outcome in outcomes {
            assert_eq!(outcome.await.expect("settled"), IntakeOutcome::Ack);
        }
        assert_eq!(poison_outcome.await.expect("settled"), IntakeOutcome::Discard);

        drop(tx);
        worker.await.expect("worker");

        let active = intake.coordinator().get_active_queue().await.expect("active");
        assert_eq!(active.len(), 20);
        let mut numbers: Vec<u64> = active.iter().map(|entry| entry.queue_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), 20);
    }

    #[tokio::test]
    async fn test_run_drains_in_flight_work_on_shutdown() {
        let store = Arc::new(FaultyStore::new());
        store.stall("insert", Duration::from_millis(50));
        let coordinator = Arc::new(QueueCoordinator::new(Arc::clone(&store)));
        let intake = Arc::new(EventIntake::new(coordinator).with_max_in_flight(1));

        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&intake).run(rx, shutdown_rx));

        let (first, first_outcome) = ChannelDelivery::new(payload(1, 1, "confirmed"));
        tx.send(first).await.expect("send");
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (queued, queued_outcome) = ChannelDelivery::new(payload(2, 1, "confirmed"));
        tx.send(queued).await.expect("send");
        shutdown_tx.send(true).expect("signal shutdown");

        worker.await.expect("worker");
        assert_eq!(first_outcome.await, Ok(IntakeOutcome::Ack));
        // Never picked up, left for the transport to redeliver.
        assert!(queued_outcome.await.is_err());
        assert!(tx.send(ChannelDelivery::detached(Vec::new())).await.is_err());
        assert!(store.inner.is_member(1));
        assert!(!store.inner.is_member(2));
    }
}
