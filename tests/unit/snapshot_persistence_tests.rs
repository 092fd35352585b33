#[cfg(test)]
mod tests_snapshot_persistence {
    use orderqueue_rs::queue::QUEUE_SNAPSHOT_FORMAT_VERSION;
    use orderqueue_rs::{MemoryStore, QueueCoordinator, QueueSnapshotPackage, StoreError};
    use std::sync::Arc;

    async fn populated_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let queue = QueueCoordinator::new(Arc::clone(&store));
        for order_id in [11, 12, 13] {
            queue.add_to_queue(order_id, 1).await.expect("add");
        }
        queue.update_status(12, "preparing").await.expect("update");
        queue.remove_from_queue(11).await.expect("remove");
        store
    }

    #[tokio::test]
    async fn persisted_queue_survives_restart() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("queue.json");

        let store = populated_store().await;
        store.persist_to_path(&path).expect("persist");
        assert!(!path.with_extension("tmp").exists());

        let reloaded = Arc::new(MemoryStore::load_from_path(&path).expect("load"));
        let queue = QueueCoordinator::new(Arc::clone(&reloaded));

        let active = queue.get_active_queue().await.expect("active");
        let ids: Vec<u64> = active.iter().map(|entry| entry.order_id).collect();
        assert_eq!(ids, vec![12, 13]);
        assert_eq!(active[0].status.as_str(), "preparing");
        assert_eq!(active[1].estimated_wait_minutes, 5);

        let stats = queue.get_queue_stats().await.expect("stats");
        assert_eq!(stats.active_orders_count, 2);

        // Numbering continues after the highest number handed out.
        let next = queue.add_to_queue(14, 1).await.expect("add");
        assert_eq!(next.queue_number, 4);
    }

    #[tokio::test]
    async fn tampered_snapshot_file_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("queue.json");

        let store = populated_store().await;
        let mut package = store.snapshot_package().expect("package");
        assert_eq!(package.version, QUEUE_SNAPSHOT_FORMAT_VERSION);
        package.snapshot.sequence += 10;
        std::fs::write(&path, package.to_json().expect("json")).expect("write");

        let err = MemoryStore::load_from_path(&path).expect_err("checksum must fail");
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_snapshot_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = MemoryStore::load_from_path(dir.path().join("absent.json"))
            .expect_err("missing file");
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn package_json_round_trip_preserves_order() {
        let store = populated_store().await;
        let json = store
            .snapshot_package()
            .expect("package")
            .to_json()
            .expect("json");

        let package = QueueSnapshotPackage::from_json(&json).expect("decode");
        let restored = MemoryStore::new();
        restored
            .restore_from_snapshot_package(package)
            .expect("restore");
        assert_eq!(restored.member_ids(), store.member_ids());
        assert_eq!(restored.current_sequence(), store.current_sequence());
    }
}
