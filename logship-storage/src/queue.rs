use async_trait::async_trait;
use logship_core::{LogRecord, QueueItem, ShipperError};
use std::fmt::Debug;

// Submodules for the storage backends
mod fs_queue;
mod memory_queue;
pub use fs_queue::{FsQueue, LOG_DIR};
pub use memory_queue::MemoryQueue;

/// Outcome of one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// deferred items renamed back to their ready name
    pub restored: usize,
    /// deferred items left in place because the ready name was taken
    pub skipped: usize,
    /// interrupted writes removed
    pub discarded_partial: usize,
}

/// A durable queue of log files.
///
/// The backing store is the queue: every item is a uniquely named entry, and each
/// state transition touches exactly one entry with an individually atomic
/// operation (create-new, move without replace, delete). Producers only call `enqueue`; the
/// uploader owns the transitions.
#[async_trait]
pub trait DurableQueue: Debug + Send + Sync {
    /// Encode `record` and persist it as a new ready item.
    ///
    /// Fails with [`ShipperError::Collision`] when the ready name already exists.
    async fn enqueue(&self, record: &LogRecord) -> Result<QueueItem, ShipperError>;

    /// Ready items, sorted by name. This is not guaranteed to be enqueue order.
    async fn list_ready(&self) -> Result<Vec<QueueItem>, ShipperError>;

    /// Withhold an item after a failed upload. No-op if the item is already gone.
    ///
    /// Fails with [`ShipperError::Collision`] when a deferred entry of the same name is
    /// already held (one kept by recovery); both entries are then left untouched.
    async fn mark_deferred(&self, item: &QueueItem) -> Result<(), ShipperError>;

    /// Remove an item after a successful upload. No-op if the item is already gone.
    async fn delete(&self, item: &QueueItem) -> Result<(), ShipperError>;

    /// Restore every deferred item to ready. Run once at startup, before draining.
    async fn recover(&self) -> Result<RecoveryReport, ShipperError>;

    /// Short backend label used in logs.
    fn backend(&self) -> &'static str;
}
