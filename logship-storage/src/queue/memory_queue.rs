use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use logship_core::{LogRecord, QueueItem, ShipperError};
use metrics::counter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DurableQueue, RecoveryReport};
use crate::codec::RecordCodec;
use crate::shipper_metrics::{QUEUE_BYTES_WRITTEN_TOTAL, QUEUE_RECORDS_WRITTEN_TOTAL};

/// In-memory queue with the same naming and transition rules as [`super::FsQueue`].
///
/// Entries are keyed by their full name (`*.gz`, `*.gz.tmp`), so the map plays the
/// role of the directory. Item paths are synthetic and cannot be read from disk.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    dir: PathBuf,
    entries: Arc<DashMap<String, Vec<u8>>>,
    codec: Arc<Mutex<RecordCodec>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from("memory://LogFiles"),
            entries: Arc::new(DashMap::new()),
            codec: Arc::new(Mutex::new(RecordCodec::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All entry names currently held, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Place a raw entry, bypassing the codec. Used to stage states left by a previous run.
    pub fn insert_raw(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(name.into(), bytes);
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn enqueue(&self, record: &LogRecord) -> Result<QueueItem, ShipperError> {
        let item = QueueItem::for_record(&self.dir, record);
        let bytes = self.codec.lock().await.encode(record)?;
        let size = bytes.len();

        match self.entries.entry(item.name().to_string()) {
            Entry::Occupied(_) => {
                warn!(target = "log_queue", item = %item, "ready entry already exists, refusing to overwrite");
                return Err(ShipperError::Collision(item.name().to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(bytes);
            }
        }

        counter!(QUEUE_RECORDS_WRITTEN_TOTAL.name, "backend" => "memory").increment(1);
        counter!(QUEUE_BYTES_WRITTEN_TOTAL.name, "backend" => "memory").increment(size as u64);
        debug!(target = "log_queue", item = %item, size, "enqueued log entry");
        Ok(item)
    }

    async fn list_ready(&self) -> Result<Vec<QueueItem>, ShipperError> {
        Ok(self
            .names()
            .iter()
            .filter_map(|name| QueueItem::from_ready_name(&self.dir, name))
            .collect())
    }

    async fn mark_deferred(&self, item: &QueueItem) -> Result<(), ShipperError> {
        let Some((_, bytes)) = self.entries.remove(item.name()) else {
            debug!(target = "log_queue", item = %item, "log entry already gone, nothing to defer");
            return Ok(());
        };
        // the entry guard is released before the ready entry is put back
        let refused = match self.entries.entry(item.deferred_name()) {
            Entry::Vacant(slot) => {
                slot.insert(bytes);
                None
            }
            Entry::Occupied(_) => Some(bytes),
        };
        if let Some(bytes) = refused {
            self.entries.insert(item.name().to_string(), bytes);
            warn!(target = "log_queue", item = %item, "deferred entry already exists, keeping both entries");
            return Err(ShipperError::Collision(item.deferred_name()));
        }
        debug!(target = "log_queue", item = %item, "deferred log entry");
        Ok(())
    }

    async fn delete(&self, item: &QueueItem) -> Result<(), ShipperError> {
        if self.entries.remove(item.name()).is_none() {
            debug!(target = "log_queue", item = %item, "log entry already gone, nothing to delete");
        }
        Ok(())
    }

    async fn recover(&self) -> Result<RecoveryReport, ShipperError> {
        let mut report = RecoveryReport::default();
        for name in self.names() {
            let Some(item) = QueueItem::from_deferred_name(&self.dir, &name) else {
                continue;
            };
            if self.entries.contains_key(item.name()) {
                warn!(target = "recovery", item = %item, "ready entry already exists, leaving deferred entry in place");
                report.skipped += 1;
                continue;
            }
            if let Some((_, bytes)) = self.entries.remove(&name) {
                self.entries.insert(item.name().to_string(), bytes);
                report.restored += 1;
            }
        }
        info!(
            target = "recovery",
            restored = report.restored,
            skipped = report.skipped,
            "recovery pass completed"
        );
        Ok(report)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
