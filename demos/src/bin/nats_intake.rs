// demos/src/bin/nats_intake.rs
//
// Runs the event intake against a NATS JetStream server. The demo binds the
// durable consumer, publishes a handful of order status events the way the
// order service would, and prints the queue as it changes. Stop it with
// Ctrl-C; in-flight events are settled before exit.
//
// Requires a JetStream-enabled server, e.g.:
//   nats-server -js
//
// Run this example with:
//   NATS_URL=nats://127.0.0.1:4222 cargo run --bin nats_intake --features nats
//   (from the demos directory)

use async_nats::jetstream;
use orderqueue_rs::prelude::*;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{info, warn};

const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();
    info!("NATS Intake Example");

    let mut config = QueueConfig::from_env()?;
    let url = config
        .intake
        .nats_url
        .get_or_insert_with(|| DEFAULT_NATS_URL.to_string())
        .clone();

    let (notifier, listener) =
        ChangeNotifier::from_config(Handle::current(), &config.notifier).into_listener();
    let mut observer = notifier.subscribe();
    tokio::spawn(async move {
        while let Some(event) = observer.recv().await {
            info!("{} for order {}", event.kind(), event.order_id());
        }
    });

    let queue = Arc::new(
        QueueCoordinator::from_config(Arc::new(MemoryStore::new()), &config)
            .with_change_listener(listener),
    );
    let intake = Arc::new(EventIntake::from_config(Arc::clone(&queue), &config.intake));

    let client = async_nats::connect(url.as_str()).await?;
    let context = jetstream::new(client);
    let consumer = NatsOrderEventConsumer::bind(context.clone(), &config.intake).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = consumer.spawn(Arc::clone(&intake), shutdown_rx);

    publish_sample_events(&context).await;

    info!("waiting for Ctrl-C");
    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(true);

    match running.await {
        Ok(Ok(())) => info!("intake stopped"),
        Ok(Err(err)) => warn!("intake stopped with error: {}", err),
        Err(err) => warn!("intake task failed: {}", err),
    }

    for entry in queue.get_active_queue().await? {
        info!(
            "#{} order {} wait {} min",
            entry.queue_number, entry.order_id, entry.estimated_wait_minutes
        );
    }
    info!(
        "intake: received={} added={} removed={} ignored={} discarded={}",
        intake.received(),
        intake.added(),
        intake.removed(),
        intake.ignored(),
        intake.discarded()
    );
    Ok(())
}

async fn publish_sample_events(context: &jetstream::Context) {
    let events = [
        OrderEvent::new(2001, 11, "confirmed"),
        OrderEvent::new(2002, 12, "confirmed"),
        OrderEvent::new(2003, 13, "confirmed"),
        OrderEvent::new(2001, 11, "completed"),
        OrderEvent::new(2003, 13, "cancelled"),
    ];

    for event in &events {
        match publish_order_event(context, event).await {
            Ok(()) => info!("published {} for order {}", event.routing_key(), event.order_id),
            Err(err) => warn!("failed to publish order {}: {}", event.order_id, err),
        }
    }
}
