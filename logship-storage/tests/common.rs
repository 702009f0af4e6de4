use async_trait::async_trait;
use logship_core::{
    DependencyStatus, ProgressCallback, RemoteTransport, UploadOutcome, UploadProgress,
    UploadRequest,
};
use logship_storage::{DurableQueue, FsQueue, LogShipper, Signals, UploaderConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport that always succeeds or always fails, recording what it was asked to send.
#[derive(Debug)]
#[allow(dead_code)]
pub struct FixedTransport {
    succeed: bool,
    calls: AtomicUsize,
    remote_paths: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FixedTransport {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::with_outcome(true))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::with_outcome(false))
    }

    fn with_outcome(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
            remote_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remote_paths(&self) -> Vec<String> {
        self.remote_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransport for FixedTransport {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: ProgressCallback,
        _cancel: tokio_util::sync::CancellationToken,
    ) -> UploadOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.remote_paths
            .lock()
            .unwrap()
            .push(request.remote_path.clone());
        if !self.succeed {
            return UploadOutcome::Failure("remote rejected the upload".to_string());
        }
        let size = std::fs::metadata(&request.local_path)
            .map(|m| m.len())
            .unwrap_or(0);
        on_progress(UploadProgress {
            bytes_transferred: size,
            total_bytes: size,
        });
        UploadOutcome::Success
    }

    async fn probe(&self) -> DependencyStatus {
        DependencyStatus::Available
    }

    fn provider(&self) -> &str {
        "fixed"
    }
}

/// Uploader timings short enough for tests.
#[allow(dead_code)]
pub fn fast_config() -> UploaderConfig {
    UploaderConfig {
        poll_interval_ms: 20,
        dependency_poll_interval_ms: 10,
        permission_poll_interval_ms: 10,
        shutdown_timeout_ms: 500,
        ..Default::default()
    }
}

/// Starts a shipper over a fs queue in `root/LogFiles`.
#[allow(dead_code)]
pub async fn start_fs_shipper(
    root: &Path,
    transport: Arc<dyn RemoteTransport>,
    signals: Signals,
) -> LogShipper {
    let queue: Arc<dyn DurableQueue> =
        Arc::new(FsQueue::under_root(root).await.expect("open fs queue"));
    LogShipper::initialize(fast_config(), queue, transport, signals)
        .await
        .expect("initialize shipper")
}

/// File names currently in the queue directory, sorted.
#[allow(dead_code)]
pub fn queue_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[allow(dead_code)]
pub fn log_dir(root: &Path) -> PathBuf {
    root.join(logship_storage::LOG_DIR)
}

/// Waits for a condition to be true with timeout
#[allow(dead_code)]
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
