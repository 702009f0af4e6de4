use logship_core::transport::GZIP_CONTENT_TYPE;
use logship_core::{
    DependencyStatus, ProgressCallback, QueueItem, RemoteTransport, ShipperError, UploadOutcome,
    UploadProgress, UploadRequest,
};
use dashmap::DashSet;
use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::DurableQueue;
use crate::shipper_metrics::{
    QUEUE_READY_ITEMS, UPLOAD_BYTES_TOTAL, UPLOAD_LATENCY_MS, UPLOAD_TOTAL,
};
use crate::signals::Signals;

/// Uploader configuration.
///
/// Fields:
/// - `poll_interval_ms`: sleep between drain cycles, also the latency bound for new items
/// - `dependency_poll_interval_ms`: how often the dependency verdict is checked
/// - `permission_poll_interval_ms`: how often the send permission is checked
/// - `remote_root`: prefix of every remote object key (e.g. "Root")
/// - `content_type`: content type attached to uploads
/// - `shutdown_timeout_ms`: how long shutdown waits for an in-flight upload before cancelling it
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub poll_interval_ms: u64,
    pub dependency_poll_interval_ms: u64,
    pub permission_poll_interval_ms: u64,
    pub remote_root: String,
    pub content_type: String,
    pub shutdown_timeout_ms: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            dependency_poll_interval_ms: 500,
            permission_poll_interval_ms: 1000,
            remote_root: "Root".to_string(),
            content_type: GZIP_CONTENT_TYPE.to_string(),
            shutdown_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploaderState {
    WaitingForDependency,
    WaitingForPermission,
    Draining,
    /// The dependency verdict was negative; nothing is drained in this run.
    DependencyUnavailable,
    Stopped,
}

enum Gate {
    Open,
    Closed,
    Cancelled,
}

/// The upload currently owned by the loop.
struct InFlight {
    item: QueueItem,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drains the durable queue through a [`RemoteTransport`], one upload at a time.
///
/// Successful uploads delete the item; failed or cancelled uploads defer it until the
/// next startup recovery. Shutdown is cooperative via a `CancellationToken`.
#[derive(Debug)]
pub struct Uploader {
    cfg: UploaderConfig,
    queue: Arc<dyn DurableQueue>,
    transport: Arc<dyn RemoteTransport>,
    signals: Signals,
    in_flight: Arc<AtomicBool>,
    // ready items that could not be deferred; skipped until the next restart
    parked: Arc<DashSet<String>>,
    state: watch::Sender<UploaderState>,
}

impl Uploader {
    pub fn new(
        cfg: UploaderConfig,
        queue: Arc<dyn DurableQueue>,
        transport: Arc<dyn RemoteTransport>,
        signals: Signals,
    ) -> Self {
        let (state, _rx) = watch::channel(UploaderState::WaitingForDependency);
        Self {
            cfg,
            queue,
            transport,
            signals,
            in_flight: Arc::new(AtomicBool::new(false)),
            parked: Arc::new(DashSet::new()),
            state,
        }
    }

    pub fn state(&self) -> UploaderState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploaderState> {
        self.state.subscribe()
    }

    /// Whether an upload is currently in flight.
    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Spawn the background loop. It stops at the next cycle boundary once `cancel` fires.
    pub fn start_with_cancel(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), ShipperError>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), ShipperError> {
        info!(
            target = "uploader",
            provider = self.transport.provider(),
            queue = self.queue.backend(),
            interval_ms = self.cfg.poll_interval_ms,
            "uploader started"
        );

        match self.wait_for_dependency(&cancel).await {
            Gate::Open => {}
            Gate::Closed => {
                self.set_state(UploaderState::DependencyUnavailable);
                return Ok(());
            }
            Gate::Cancelled => {
                self.set_state(UploaderState::Stopped);
                return Ok(());
            }
        }

        self.set_state(UploaderState::WaitingForPermission);
        if let Gate::Cancelled = self.wait_for_permission(&cancel).await {
            self.set_state(UploaderState::Stopped);
            return Ok(());
        }

        self.set_state(UploaderState::Draining);
        let poll = Duration::from_millis(self.cfg.poll_interval_ms);
        let mut current: Option<InFlight> = None;
        loop {
            if !sleep_or_cancel(&cancel, poll).await {
                break;
            }
            current = self.reap_finished(current).await;
            if let Some(next) = self.run_once().await {
                current = Some(next);
            }
        }

        self.drain_in_flight(current).await;
        self.set_state(UploaderState::Stopped);
        info!(target = "uploader", "uploader stopped");
        Ok(())
    }

    async fn wait_for_dependency(&self, cancel: &CancellationToken) -> Gate {
        let interval = Duration::from_millis(self.cfg.dependency_poll_interval_ms);
        loop {
            match self.signals.dependency() {
                Some(DependencyStatus::Available) => {
                    debug!(target = "uploader", "remote dependency available");
                    return Gate::Open;
                }
                Some(DependencyStatus::Unavailable(reason)) => {
                    warn!(target = "uploader", reason = %reason, "remote dependency unavailable, logs stay queued for a later run");
                    return Gate::Closed;
                }
                None => {}
            }
            if !sleep_or_cancel(cancel, interval).await {
                return Gate::Cancelled;
            }
        }
    }

    async fn wait_for_permission(&self, cancel: &CancellationToken) -> Gate {
        let interval = Duration::from_millis(self.cfg.permission_poll_interval_ms);
        while !self.signals.can_send() {
            if !sleep_or_cancel(cancel, interval).await {
                return Gate::Cancelled;
            }
        }
        debug!(target = "uploader", "send permission granted");
        Gate::Open
    }

    /// One drain cycle: list, then dispatch the first ready item unless an upload is in flight.
    async fn run_once(&self) -> Option<InFlight> {
        let items = match self.queue.list_ready().await {
            Ok(items) => items,
            Err(e) => {
                error!(target = "uploader", error = %e, "listing ready log files failed");
                return None;
            }
        };
        gauge!(QUEUE_READY_ITEMS.name).set(items.len() as f64);

        let item = items
            .into_iter()
            .find(|item| !self.parked.contains(item.name()))?;
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(target = "uploader", "upload in flight, skipping cycle");
            return None;
        }
        Some(self.dispatch(item))
    }

    fn dispatch(&self, item: QueueItem) -> InFlight {
        let request = UploadRequest {
            local_path: item.path().to_path_buf(),
            remote_path: item.remote_path(&self.cfg.remote_root),
            content_type: self.cfg.content_type.clone(),
        };
        info!(target = "uploader", item = %item, remote = %request.remote_path, "uploading log file");

        let transferred = Arc::new(AtomicU64::new(0));
        let on_progress: ProgressCallback = {
            let name = item.name().to_string();
            let transferred = transferred.clone();
            Arc::new(move |p: UploadProgress| {
                transferred.store(p.bytes_transferred, Ordering::Release);
                debug!(target = "uploader", item = %name, bytes = p.bytes_transferred, total = p.total_bytes, "upload progress");
            })
        };

        let completion = Completion {
            queue: self.queue.clone(),
            in_flight: self.in_flight.clone(),
            parked: self.parked.clone(),
            provider: self.transport.provider().to_string(),
        };
        let transport = self.transport.clone();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_item = item.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = transport.upload(request, on_progress, task_cancel).await;
            completion
                .complete(
                    &task_item,
                    outcome,
                    started.elapsed(),
                    transferred.load(Ordering::Acquire),
                )
                .await;
        });

        InFlight {
            item,
            cancel,
            handle,
        }
    }

    /// Release the single-flight guard if the last upload task died before completing.
    async fn reap_finished(&self, current: Option<InFlight>) -> Option<InFlight> {
        match current {
            Some(f) if f.handle.is_finished() => {
                let joined = f.handle.await;
                self.settle_join(&f.item, joined).await;
                None
            }
            other => other,
        }
    }

    async fn drain_in_flight(&self, current: Option<InFlight>) {
        let Some(InFlight {
            item,
            cancel,
            mut handle,
        }) = current
        else {
            return;
        };
        if !handle.is_finished() {
            info!(target = "uploader", item = %item, "waiting for in-flight upload before stopping");
        }
        let timeout = Duration::from_millis(self.cfg.shutdown_timeout_ms);
        let joined = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(target = "uploader", item = %item, timeout_ms = self.cfg.shutdown_timeout_ms, "in-flight upload exceeded shutdown timeout, cancelling");
                cancel.cancel();
                handle.await
            }
        };
        self.settle_join(&item, joined).await;
    }

    async fn settle_join(&self, item: &QueueItem, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!(target = "uploader", item = %item, error = %e, "upload task ended without completing, deferring");
            if let Err(e) = self.queue.mark_deferred(item).await {
                error!(target = "uploader", item = %item, error = %e, "failed to defer log file");
                park_on_collision(&self.parked, item, &e);
            }
            self.in_flight.store(false, Ordering::Release);
        }
    }

    fn set_state(&self, state: UploaderState) {
        debug!(target = "uploader", state = ?state, "uploader state changed");
        self.state.send_replace(state);
    }
}

/// Completion handler for one upload. Runs on the upload task, never on the loop.
#[derive(Debug, Clone)]
struct Completion {
    queue: Arc<dyn DurableQueue>,
    in_flight: Arc<AtomicBool>,
    parked: Arc<DashSet<String>>,
    provider: String,
}

impl Completion {
    async fn complete(
        &self,
        item: &QueueItem,
        outcome: UploadOutcome,
        elapsed: Duration,
        transferred: u64,
    ) {
        let transition = match &outcome {
            UploadOutcome::Success => {
                info!(target = "uploader", item = %item, elapsed_ms = elapsed.as_millis() as u64, "upload succeeded");
                counter!(UPLOAD_BYTES_TOTAL.name, "provider" => self.provider.clone()).increment(transferred);
                self.queue.delete(item).await
            }
            UploadOutcome::Failure(reason) => {
                error!(target = "uploader", item = %item, reason = %reason, "upload failed, deferring until next restart");
                self.queue.mark_deferred(item).await
            }
            UploadOutcome::Cancelled => {
                warn!(target = "uploader", item = %item, "upload cancelled, deferring until next restart");
                self.queue.mark_deferred(item).await
            }
        };
        if let Err(e) = transition {
            error!(target = "uploader", item = %item, outcome = %outcome, error = %e, "queue transition after upload failed");
            park_on_collision(&self.parked, item, &e);
        }

        counter!(UPLOAD_TOTAL.name, "provider" => self.provider.clone(), "result" => outcome.as_label()).increment(1);
        histogram!(UPLOAD_LATENCY_MS.name, "provider" => self.provider.clone())
            .record(elapsed.as_secs_f64() * 1000.0);

        self.in_flight.store(false, Ordering::Release);
    }
}

/// A ready item whose deferred name is taken stays ready on disk; it must not be
/// picked again in this run.
fn park_on_collision(parked: &DashSet<String>, item: &QueueItem, err: &ShipperError) {
    if let ShipperError::Collision(_) = err {
        warn!(target = "uploader", item = %item, "leaving log file ready but skipping it until next restart");
        parked.insert(item.name().to_string());
    }
}

/// Sleep for `period` unless cancelled first. Returns `false` on cancellation.
async fn sleep_or_cancel(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
