use async_trait::async_trait;
use logship_core::{
    DependencyStatus, ProgressCallback, RemoteTransport, UploadOutcome, UploadProgress,
    UploadRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    Succeed,
    Fail,
    /// Block until `release` hands out a permit, then succeed.
    Hold,
    /// Panic on the first upload, succeed afterwards.
    PanicFirst,
}

/// Transport double that records requests and tracks concurrent uploads.
#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    script: Script,
    gate: Semaphore,
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    requests: Mutex<Vec<UploadRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Let `n` held uploads finish.
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<UploadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        self.requests.lock().unwrap().push(request);
        self.started.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let outcome = match self.script {
            Script::Succeed => {
                on_progress(UploadProgress {
                    bytes_transferred: 10,
                    total_bytes: 10,
                });
                UploadOutcome::Success
            }
            Script::Fail => UploadOutcome::Failure("scripted failure".to_string()),
            Script::PanicFirst => {
                if self.started() == 1 {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    panic!("transport blew up mid upload");
                }
                UploadOutcome::Success
            }
            Script::Hold => {
                tokio::select! {
                    permit = self.gate.acquire() => {
                        permit.expect("gate closed").forget();
                        UploadOutcome::Success
                    }
                    _ = cancel.cancelled() => UploadOutcome::Cancelled,
                }
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn probe(&self) -> DependencyStatus {
        DependencyStatus::Available
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}

/// Polls `f` until it returns true or `timeout_ms` elapses.
pub(crate) async fn wait_for_condition<F>(mut f: F, timeout_ms: u64, interval_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let mut waited = 0u64;
    while waited <= timeout_ms {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        waited += interval_ms;
    }
    false
}
