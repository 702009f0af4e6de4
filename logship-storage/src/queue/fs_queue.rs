use async_trait::async_trait;
use logship_core::{LogRecord, QueueItem, ShipperError};
use metrics::counter;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DurableQueue, RecoveryReport};
use crate::codec::RecordCodec;
use crate::shipper_metrics::{
    QUEUE_BYTES_WRITTEN_TOTAL, QUEUE_RECOVERED_TOTAL, QUEUE_RECORDS_WRITTEN_TOTAL,
};

/// Queue directory name under the application storage root.
pub const LOG_DIR: &str = "LogFiles";

/// Directory-backed queue. The directory listing is the queue:
///
/// LogFiles/
///     20240101120000_0.gz        ready
///     20240101120000_1.gz.tmp    deferred after a failed upload
///     20240101120001_2.gz.part   being written, never listed
#[derive(Debug)]
pub struct FsQueue {
    dir: PathBuf,
    codec: Mutex<RecordCodec>,
}

impl FsQueue {
    /// Open (and create if missing) a queue rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ShipperError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ShipperError::Io(format!("create queue dir {} failed: {}", dir.display(), e))
        })?;
        info!(target = "log_queue", dir = %dir.display(), "opened log queue");
        Ok(Self {
            dir,
            codec: Mutex::new(RecordCodec::new()),
        })
    }

    /// Open the queue in the `LogFiles` directory of an application storage root.
    pub async fn under_root(storage_root: impl AsRef<Path>) -> Result<Self, ShipperError> {
        Self::open(storage_root.as_ref().join(LOG_DIR)).await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_names(&self) -> Result<Vec<String>, ShipperError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            ShipperError::Io(format!("read queue dir {} failed: {}", self.dir.display(), e))
        })?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShipperError::Io(format!("read queue entry failed: {}", e)))?
        {
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Write `bytes` to the item's `.part` file and make it durable.
    async fn write_part(&self, item: &QueueItem, bytes: &[u8]) -> Result<(), ShipperError> {
        let part = item.writing_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ShipperError::Collision(item.writing_name()),
                _ => ShipperError::Io(format!("open {} failed: {}", part.display(), e)),
            })?;

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ShipperError::Io(format!(
                "write {} failed: {}",
                part.display(),
                e
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableQueue for FsQueue {
    async fn enqueue(&self, record: &LogRecord) -> Result<QueueItem, ShipperError> {
        let item = QueueItem::for_record(&self.dir, record);
        let bytes = self.codec.lock().await.encode(record)?;

        self.write_part(&item, &bytes).await?;

        // hard_link never replaces an existing target, which gives create-new
        // semantics on the ready name while readers only ever see complete files
        let part = item.writing_path();
        let linked = tokio::fs::hard_link(&part, item.path()).await;
        if let Err(e) = tokio::fs::remove_file(&part).await {
            warn!(target = "log_queue", file = %part.display(), error = %e, "failed to remove part file");
        }
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(target = "log_queue", item = %item, "ready file already exists, refusing to overwrite");
                return Err(ShipperError::Collision(item.name().to_string()));
            }
            Err(e) => {
                return Err(ShipperError::Io(format!(
                    "publish {} failed: {}",
                    item.path().display(),
                    e
                )))
            }
        }

        counter!(QUEUE_RECORDS_WRITTEN_TOTAL.name, "backend" => "fs").increment(1);
        counter!(QUEUE_BYTES_WRITTEN_TOTAL.name, "backend" => "fs").increment(bytes.len() as u64);
        debug!(target = "log_queue", item = %item, size = bytes.len(), "enqueued log file");
        Ok(item)
    }

    async fn list_ready(&self) -> Result<Vec<QueueItem>, ShipperError> {
        let mut items: Vec<QueueItem> = self
            .read_names()
            .await?
            .iter()
            .filter_map(|name| QueueItem::from_ready_name(&self.dir, name))
            .collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }

    async fn mark_deferred(&self, item: &QueueItem) -> Result<(), ShipperError> {
        match move_no_replace(item.path(), &item.deferred_path()).await {
            Ok(()) => {
                debug!(target = "log_queue", item = %item, "deferred log file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target = "log_queue", item = %item, "log file already gone, nothing to defer");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(target = "log_queue", item = %item, "deferred file already exists, keeping both files");
                Err(ShipperError::Collision(item.deferred_name()))
            }
            Err(e) => Err(ShipperError::Io(format!(
                "defer {} failed: {}",
                item.path().display(),
                e
            ))),
        }
    }

    async fn delete(&self, item: &QueueItem) -> Result<(), ShipperError> {
        match tokio::fs::remove_file(item.path()).await {
            Ok(()) => {
                debug!(target = "log_queue", item = %item, "deleted log file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target = "log_queue", item = %item, "log file already gone, nothing to delete");
                Ok(())
            }
            Err(e) => Err(ShipperError::Io(format!(
                "delete {} failed: {}",
                item.path().display(),
                e
            ))),
        }
    }

    async fn recover(&self) -> Result<RecoveryReport, ShipperError> {
        let mut report = RecoveryReport::default();

        for name in self.read_names().await? {
            if let Some(item) = QueueItem::from_deferred_name(&self.dir, &name) {
                match move_no_replace(&item.deferred_path(), item.path()).await {
                    Ok(()) => {
                        debug!(target = "recovery", item = %item, "restored deferred log file");
                        report.restored += 1;
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        warn!(target = "recovery", item = %item, "ready file already exists, leaving deferred file in place");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        warn!(target = "recovery", item = %item, error = %e, "failed to restore deferred log file");
                        report.skipped += 1;
                    }
                }
            } else if let Some(item) = QueueItem::from_writing_name(&self.dir, &name) {
                match tokio::fs::remove_file(item.writing_path()).await {
                    Ok(()) => {
                        debug!(target = "recovery", item = %item, "removed interrupted write");
                        report.discarded_partial += 1;
                    }
                    Err(e) => {
                        warn!(target = "recovery", item = %item, error = %e, "failed to remove interrupted write");
                    }
                }
            }
        }

        counter!(QUEUE_RECOVERED_TOTAL.name, "result" => "restored").increment(report.restored as u64);
        counter!(QUEUE_RECOVERED_TOTAL.name, "result" => "skipped").increment(report.skipped as u64);
        counter!(QUEUE_RECOVERED_TOTAL.name, "result" => "discarded_partial")
            .increment(report.discarded_partial as u64);
        info!(
            target = "recovery",
            dir = %self.dir.display(),
            restored = report.restored,
            skipped = report.skipped,
            discarded_partial = report.discarded_partial,
            "recovery pass completed"
        );
        Ok(report)
    }

    fn backend(&self) -> &'static str {
        "fs"
    }
}

/// Move `from` to `to`, failing with `AlreadyExists` instead of replacing `to`.
///
/// The link is the commit point; a source left behind by a failed unlink is only warned about.
async fn move_no_replace(from: &Path, to: &Path) -> std::io::Result<()> {
    tokio::fs::hard_link(from, to).await?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!(target = "log_queue", file = %from.display(), error = %e, "linked but could not remove source");
    }
    Ok(())
}
