#[cfg(test)]
mod tests {
    use crate::queue::{DurableQueue, MemoryQueue};
    use crate::signals::Signals;
    use crate::test_transport::{wait_for_condition, Script, ScriptedTransport};
    use crate::uploader::{Uploader, UploaderConfig, UploaderState};
    use chrono::{TimeZone, Utc};
    use logship_core::{DependencyStatus, LogRecord, ShipperError};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    fn fast_config() -> UploaderConfig {
        UploaderConfig {
            poll_interval_ms: 20,
            dependency_poll_interval_ms: 10,
            permission_poll_interval_ms: 10,
            shutdown_timeout_ms: 200,
            ..Default::default()
        }
    }

    fn record(sequence: u64) -> LogRecord {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        LogRecord::new(sequence, at, json!({ "dummyString": "blahblah", "testFlag": 1 }))
    }

    fn open_signals() -> Signals {
        let signals = Signals::new();
        signals.report_dependency(DependencyStatus::Available);
        signals.set_can_send(true);
        signals
    }

    fn start(
        cfg: UploaderConfig,
        queue: &MemoryQueue,
        transport: Arc<ScriptedTransport>,
        signals: Signals,
    ) -> (
        Arc<Uploader>,
        CancellationToken,
        JoinHandle<Result<(), ShipperError>>,
    ) {
        let queue: Arc<dyn DurableQueue> = Arc::new(queue.clone());
        let uploader = Arc::new(Uploader::new(cfg, queue, transport, signals));
        let cancel = CancellationToken::new();
        let handle = uploader.clone().start_with_cancel(cancel.clone());
        (uploader, cancel, handle)
    }

    /// Test: default configuration values
    #[test]
    fn test_uploader_config_default() {
        let config = UploaderConfig::default();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.dependency_poll_interval_ms, 500);
        assert_eq!(config.permission_poll_interval_ms, 1000);
        assert_eq!(config.remote_root, "Root");
        assert_eq!(config.content_type, "application/x-gzip");
    }

    /// Test: a successful upload deletes the item
    ///
    /// Expected
    /// - the transport sees `Root/{name}` with the gzip content type
    /// - the queue ends empty and the in-flight flag is cleared
    #[tokio::test]
    async fn test_successful_upload_deletes_item() {
        let queue = MemoryQueue::new();
        let item = queue.enqueue(&record(0)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::Succeed));

        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), open_signals());

        let q = queue.clone();
        assert!(wait_for_condition(|| q.names().is_empty(), 3000, 10).await);
        assert!(wait_for_condition(|| !uploader.is_uploading(), 1000, 10).await);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].remote_path, format!("Root/{}", item.name()));
        assert_eq!(requests[0].content_type, "application/x-gzip");
        assert_eq!(requests[0].local_path, item.path());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(uploader.state(), UploaderState::Stopped);
    }

    /// Test: a failed upload defers the item and it is not retried in this run
    #[tokio::test]
    async fn test_failed_upload_defers_item_until_restart() {
        let queue = MemoryQueue::new();
        let item = queue.enqueue(&record(0)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::Fail));

        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), open_signals());

        let q = queue.clone();
        let deferred = item.deferred_name();
        assert!(wait_for_condition(|| q.names() == vec![deferred.clone()], 3000, 10).await);

        // several more cycles pass without a retry
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(transport.started(), 1);
        assert!(!uploader.is_uploading());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    /// Test: single-flight discipline
    ///
    /// Flow
    /// - hold every upload open, queue five items, then queue more while one is pending
    /// - release uploads one by one
    ///
    /// Expected
    /// - only one upload starts while the first is pending
    /// - concurrency never exceeds one, and all items drain in the end
    #[tokio::test]
    async fn test_single_flight_while_upload_pending() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue.enqueue(&record(i)).await.unwrap();
        }
        let transport = Arc::new(ScriptedTransport::new(Script::Hold));

        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), open_signals());

        let t = transport.clone();
        assert!(wait_for_condition(|| t.started() == 1, 3000, 10).await);
        assert!(uploader.is_uploading());

        for i in 5..8 {
            queue.enqueue(&record(i)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.started(), 1);
        assert_eq!(transport.max_active(), 1);

        transport.release(1);
        let t = transport.clone();
        assert!(wait_for_condition(|| t.started() == 2, 3000, 10).await);

        transport.release(100);
        let q = queue.clone();
        assert!(wait_for_condition(|| q.names().is_empty(), 5000, 10).await);
        assert_eq!(transport.started(), 8);
        assert_eq!(transport.max_active(), 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    /// Test: with the permission gate closed nothing is uploaded
    #[tokio::test]
    async fn test_closed_permission_gate_never_uploads() {
        let queue = MemoryQueue::new();
        queue.enqueue(&record(0)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::Succeed));
        let signals = Signals::new();
        signals.report_dependency(DependencyStatus::Available);

        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), signals.clone());

        let u = uploader.clone();
        assert!(
            wait_for_condition(
                || u.state() == UploaderState::WaitingForPermission,
                2000,
                10
            )
            .await
        );
        queue.enqueue(&record(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(transport.started(), 0);
        assert_eq!(queue.names().len(), 2);

        // opening the gate later starts draining
        signals.set_can_send(true);
        let q = queue.clone();
        assert!(wait_for_condition(|| q.names().is_empty(), 3000, 10).await);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    /// Test: an unavailable dependency ends the loop without draining
    #[tokio::test]
    async fn test_dependency_unavailable_exits() {
        let queue = MemoryQueue::new();
        queue.enqueue(&record(0)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::Succeed));
        let signals = Signals::new();
        signals.set_can_send(true);

        let (uploader, _cancel, handle) =
            start(fast_config(), &queue, transport.clone(), signals.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(uploader.state(), UploaderState::WaitingForDependency);

        signals.report_dependency(DependencyStatus::Unavailable("missing".into()));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits")
            .unwrap()
            .unwrap();

        assert_eq!(uploader.state(), UploaderState::DependencyUnavailable);
        assert_eq!(transport.started(), 0);
        assert_eq!(queue.names().len(), 1);
    }

    /// Test: cancelling while waiting for the dependency stops the loop promptly
    #[tokio::test]
    async fn test_cancel_while_waiting_for_dependency() {
        let queue = MemoryQueue::new();
        let transport = Arc::new(ScriptedTransport::new(Script::Succeed));
        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport, Signals::new());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits")
            .unwrap()
            .unwrap();
        assert_eq!(uploader.state(), UploaderState::Stopped);
    }

    /// Test: shutdown waits for an in-flight upload that finishes within the timeout
    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_upload() {
        let queue = MemoryQueue::new();
        queue.enqueue(&record(0)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::Hold));
        let cfg = UploaderConfig {
            shutdown_timeout_ms: 5000,
            ..fast_config()
        };

        let (uploader, cancel, handle) = start(cfg, &queue, transport.clone(), open_signals());
        let t = transport.clone();
        assert!(wait_for_condition(|| t.started() == 1, 3000, 10).await);

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        transport.release(1);
        handle.await.unwrap().unwrap();
        assert!(queue.names().is_empty());
        assert!(!uploader.is_uploading());
        assert_eq!(uploader.state(), UploaderState::Stopped);
    }

    /// Test: shutdown cancels an upload that outlives the timeout, and the item is deferred
    #[tokio::test]
    async fn test_shutdown_cancels_stuck_upload() {
        let queue = MemoryQueue::new();
        let item = queue.enqueue(&record(0)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::Hold));

        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), open_signals());
        let t = transport.clone();
        assert!(wait_for_condition(|| t.started() == 1, 3000, 10).await);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop exits after timeout")
            .unwrap()
            .unwrap();

        assert_eq!(queue.names(), vec![item.deferred_name()]);
        assert!(!uploader.is_uploading());
    }

    /// Test: an upload task that panics is reaped, its item deferred, and draining goes on
    #[tokio::test]
    async fn test_panicked_upload_is_deferred_and_loop_continues() {
        let queue = MemoryQueue::new();
        let first = queue.enqueue(&record(0)).await.unwrap();
        queue.enqueue(&record(1)).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new(Script::PanicFirst));

        let (uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), open_signals());

        let q = queue.clone();
        let deferred = first.deferred_name();
        assert!(wait_for_condition(|| q.names() == vec![deferred.clone()], 3000, 10).await);
        assert_eq!(transport.started(), 2);
        assert!(wait_for_condition(|| !uploader.is_uploading(), 1000, 10).await);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    /// Test: a failed item whose deferred name is taken stays ready and is not retried
    ///
    /// Expected
    /// - one upload attempt only, both entries untouched
    /// - later items still drain
    #[tokio::test]
    async fn test_failed_item_with_taken_deferred_name_is_skipped() {
        let queue = MemoryQueue::new();
        queue.insert_raw("20240601080000_0.gz", b"ready".to_vec());
        queue.insert_raw("20240601080000_0.gz.tmp", b"older-deferred".to_vec());
        let transport = Arc::new(ScriptedTransport::new(Script::Fail));

        let (_uploader, cancel, handle) =
            start(fast_config(), &queue, transport.clone(), open_signals());

        let t = transport.clone();
        assert!(wait_for_condition(|| t.started() == 1, 3000, 10).await);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(transport.started(), 1);
        assert_eq!(queue.contents("20240601080000_0.gz").unwrap(), b"ready");
        assert_eq!(
            queue.contents("20240601080000_0.gz.tmp").unwrap(),
            b"older-deferred"
        );

        // a newer item is still picked up
        let next = queue.enqueue(&record(1)).await.unwrap();
        let t = transport.clone();
        assert!(wait_for_condition(|| t.started() == 2, 3000, 10).await);
        let q = queue.clone();
        let deferred = next.deferred_name();
        assert!(wait_for_condition(|| q.names().contains(&deferred), 3000, 10).await);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
