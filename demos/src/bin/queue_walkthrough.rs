// demos/src/bin/queue_walkthrough.rs
//
// Walks through a canteen service window: orders are confirmed, their
// status advances, and they leave the queue when collected or cancelled.
// A change observer prints every notification the coordinator emits.
//
// Configuration is read from the environment (see `QueueConfig::from_env`).
// Set `QUEUE_SNAPSHOT_PATH` to load the queue from a snapshot at startup
// and persist it again on exit.
//
// Run this example with:
//   cargo run --bin queue_walkthrough
//   (from the demos directory)

use orderqueue_rs::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logger();
    info!("Queue Walkthrough Example");

    let config = QueueConfig::from_env()?;
    info!(
        minutes_per_order = config.minutes_per_order,
        store_timeout_ms = config.store_timeout_ms,
        "configuration loaded"
    );

    let store = Arc::new(open_store(&config));
    let (notifier, listener) =
        ChangeNotifier::from_config(Handle::current(), &config.notifier).into_listener();
    let mut observer = notifier.subscribe();
    let observer_id = observer.id();
    let printer = tokio::spawn(async move {
        while let Some(event) = observer.recv().await {
            match event.to_json() {
                Ok(json) => info!("notification: {}", json),
                Err(err) => warn!("failed to encode notification: {}", err),
            }
        }
    });

    let queue = QueueCoordinator::from_config(Arc::clone(&store), &config)
        .with_change_listener(listener);

    demo_morning_rush(&queue).await?;
    demo_status_flow(&queue).await?;
    demo_collection(&queue).await?;
    display_stats(&queue).await?;

    if let Some(path) = &config.snapshot_path {
        store.persist_to_path(path)?;
        info!("queue persisted to {}", path.display());
    }

    // Let the dispatcher flush before shutting down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(
        "notifier: received={} delivered={} dropped={}",
        notifier.events_received(),
        notifier.deliveries(),
        notifier.dropped_deliveries()
    );
    notifier.unsubscribe(observer_id);
    let _ = printer.await;
    Ok(())
}

fn open_store(config: &QueueConfig) -> MemoryStore {
    let Some(path) = &config.snapshot_path else {
        return MemoryStore::new();
    };
    match MemoryStore::load_from_path(path) {
        Ok(store) => {
            info!("resumed {} queued orders from {}", store.len(), path.display());
            store
        }
        Err(err) => {
            warn!("starting with an empty queue: {}", err);
            MemoryStore::new()
        }
    }
}

async fn demo_morning_rush(queue: &QueueCoordinator<MemoryStore>) -> Result<(), QueueError> {
    info!("\n=== Morning Rush ===");
    let orders = [(1001, 5), (1002, 6), (1003, 7), (1004, 5)];
    for (order_id, user_id) in orders {
        let entry = queue.add_to_queue(order_id, user_id).await?;
        info!(
            "order {} -> queue number {} (wait {} min)",
            entry.order_id, entry.queue_number, entry.estimated_wait_minutes
        );
    }

    // Redelivered confirmations keep the original ticket.
    let again = queue.add_to_queue(1002, 6).await?;
    info!("order 1002 confirmed again, still number {}", again.queue_number);
    Ok(())
}

async fn demo_status_flow(queue: &QueueCoordinator<MemoryStore>) -> Result<(), QueueError> {
    info!("\n=== Status Flow ===");
    queue.update_status(1001, "preparing").await?;
    queue.update_status(1001, "ready").await?;

    match queue.update_status(1001, "eaten").await {
        Err(QueueError::InvalidInput { message }) => info!("rejected status: {}", message),
        other => warn!("unexpected result: {:?}", other),
    }

    let item = queue.get_queue_item(1001).await?;
    info!("order 1001 is {} at number {}", item.status, item.queue_number);
    Ok(())
}

async fn demo_collection(queue: &QueueCoordinator<MemoryStore>) -> Result<(), QueueError> {
    info!("\n=== Collection ===");
    queue.remove_from_queue(1001).await?;
    queue.remove_from_queue(1003).await?;
    // Removing twice is fine.
    queue.remove_from_queue(1003).await?;

    for entry in queue.get_active_queue().await? {
        info!(
            "#{:<3} order {:<5} {:<10} wait {} min",
            entry.queue_number, entry.order_id, entry.status, entry.estimated_wait_minutes
        );
    }
    Ok(())
}

async fn display_stats(queue: &QueueCoordinator<MemoryStore>) -> Result<(), QueueError> {
    info!("\n=== Statistics ===");
    let stats = queue.get_queue_stats().await?;
    info!("active orders: {}", stats.active_orders_count);
    info!("average wait: {:.1} min", stats.average_wait_minutes);
    info!("orders today: {}", stats.total_orders_today);
    Ok(())
}
