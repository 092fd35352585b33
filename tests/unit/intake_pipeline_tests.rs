#[cfg(test)]
mod tests_intake_pipeline {
    use orderqueue_rs::prelude::*;
    use std::sync::Arc;
    use tokio::runtime::Handle;
    use tokio::sync::{mpsc, watch};

    fn event(order_id: u64, user_id: u64, new_status: &str) -> Vec<u8> {
        OrderEvent::new(order_id, user_id, new_status)
            .to_vec()
            .expect("serialize")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lifecycle_events_drive_queue_and_notifications() {
        let config = QueueConfig::default();
        let (notifier, listener) =
            ChangeNotifier::from_config(Handle::current(), &config.notifier).into_listener();
        let mut observer = notifier.subscribe();

        let coordinator = Arc::new(
            QueueCoordinator::from_config(Arc::new(MemoryStore::new()), &config)
                .with_change_listener(listener),
        );
        let intake = Arc::new(EventIntake::from_config(
            Arc::clone(&coordinator),
            &config.intake,
        ));

        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&intake).run(rx, shutdown_rx));

        // Sequential sends keep the feed ordered for this scenario.
        let feed = [
            event(1001, 5, "confirmed"),
            event(1002, 6, "confirmed"),
            event(1001, 5, "confirmed"),
            event(1001, 5, "preparing"),
            event(1001, 5, "completed"),
            b"garbage".to_vec(),
            event(1003, 7, "cancelled"),
        ];
        let mut outcomes = Vec::new();
        for payload in feed {
            let (delivery, outcome) = ChannelDelivery::new(payload);
            tx.send(delivery).await.expect("send");
            outcomes.push(outcome.await.expect("settled"));
        }

        assert_eq!(
            outcomes,
            vec![
                IntakeOutcome::Ack,
                IntakeOutcome::Ack,
                IntakeOutcome::Ack,
                IntakeOutcome::Ack,
                IntakeOutcome::Ack,
                IntakeOutcome::Discard,
                IntakeOutcome::Ack,
            ]
        );

        let active = coordinator.get_active_queue().await.expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].order_id, 1002);
        assert_eq!(active[0].estimated_wait_minutes, 0);

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let event = observer.recv().await.expect("notification");
            kinds.push((event.kind(), event.order_id()));
        }
        assert_eq!(
            kinds,
            vec![
                ("queue_update", 1001),
                ("queue_update", 1002),
                ("queue_removed", 1001),
            ]
        );

        shutdown_tx.send(true).expect("shutdown");
        worker.await.expect("worker");

        assert_eq!(intake.received(), 7);
        assert_eq!(intake.added(), 3);
        assert_eq!(intake.removed(), 2);
        assert_eq!(intake.ignored(), 1);
        assert_eq!(intake.discarded(), 1);
        assert_eq!(intake.requeued(), 0);
    }

    #[tokio::test]
    async fn intake_is_disabled_without_broker_url() {
        let config = QueueConfig::from_lookup(|_| None).expect("config");
        assert!(!config.intake.is_enabled());
        assert_eq!(config.intake.subjects, vec![
            "order.confirmed".to_string(),
            "order.completed".to_string(),
            "order.cancelled".to_string(),
        ]);
    }
}
