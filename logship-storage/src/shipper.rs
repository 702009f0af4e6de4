use logship_core::{LogRecord, QueueItem, RemoteTransport, ShipperError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::queue::{DurableQueue, RecoveryReport};
use crate::signals::Signals;
use crate::uploader::{Uploader, UploaderConfig, UploaderState};

/// Entry point used by the host process: recover, write, shut down.
///
/// One `LogShipper` owns exactly one background uploader. Producer calls are
/// serialized on the sequence counter, so concurrent `write` calls are safe.
#[derive(Debug)]
pub struct LogShipper {
    queue: Arc<dyn DurableQueue>,
    uploader: Arc<Uploader>,
    next_sequence: Mutex<u64>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<Result<(), ShipperError>>>>,
    recovery: RecoveryReport,
}

impl LogShipper {
    /// Run the recovery pass, then start the uploader.
    ///
    /// Recovery completes before the uploader can list anything, so deferred items
    /// from a previous run are back in the ready set by the first drain cycle.
    pub async fn initialize(
        cfg: UploaderConfig,
        queue: Arc<dyn DurableQueue>,
        transport: Arc<dyn RemoteTransport>,
        signals: Signals,
    ) -> Result<Self, ShipperError> {
        let recovery = queue.recover().await?;

        let uploader = Arc::new(Uploader::new(cfg, queue.clone(), transport, signals));
        let cancel = CancellationToken::new();
        let worker = uploader.clone().start_with_cancel(cancel.clone());
        info!(
            target = "shipper",
            queue = queue.backend(),
            restored = recovery.restored,
            "log shipper initialized"
        );

        Ok(Self {
            queue,
            uploader,
            next_sequence: Mutex::new(0),
            cancel,
            worker: Mutex::new(Some(worker)),
            recovery,
        })
    }

    /// Persist one record carrying `payload`, stamped with the current UTC second.
    ///
    /// The sequence advances only after the file was created; a collision is returned
    /// to the caller and leaves the sequence unchanged.
    pub async fn write<P: Serialize>(&self, payload: &P) -> Result<QueueItem, ShipperError> {
        let inner = serde_json::to_value(payload)?;
        let mut sequence = self.next_sequence.lock().await;
        let record = LogRecord::capture(*sequence, inner);
        let item = self.queue.enqueue(&record).await?;
        *sequence += 1;
        debug!(target = "shipper", item = %item, sequence = record.sequence, "log record written");
        Ok(item)
    }

    /// Stop the uploader at its next cycle boundary and wait for it. Idempotent.
    pub async fn destroy(&self) -> Result<(), ShipperError> {
        self.cancel.cancel();
        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };
        match worker.await {
            Ok(result) => result,
            Err(e) => {
                error!(target = "shipper", error = %e, "uploader task failed");
                Err(ShipperError::Shutdown(e.to_string()))
            }
        }
    }

    pub fn state(&self) -> watch::Receiver<UploaderState> {
        self.uploader.subscribe()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploader.is_uploading()
    }

    pub fn queue(&self) -> Arc<dyn DurableQueue> {
        self.queue.clone()
    }

    /// What the startup recovery pass did.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Sequence the next successful write will carry.
    pub async fn next_sequence(&self) -> u64 {
        *self.next_sequence.lock().await
    }
}

impl Drop for LogShipper {
    fn drop(&mut self) {
        // the worker still finishes its current cycle and drains on its own
        self.cancel.cancel();
    }
}
