pub mod codec;
pub use codec::RecordCodec;

// Durable queue (trait + fs/memory backends) and the recovery pass
pub mod queue;
pub use queue::{DurableQueue, FsQueue, MemoryQueue, RecoveryReport, LOG_DIR};

mod signals;
pub use signals::Signals;

pub mod uploader;
pub use uploader::{Uploader, UploaderConfig, UploaderState};

mod shipper;
pub use shipper::LogShipper;

pub mod cloud;
pub use cloud::{BackendConfig, CloudBackend, LocalBackend, ObjectStoreTransport};

pub mod shipper_metrics;

#[cfg(test)]
mod test_transport;
#[cfg(test)]
mod uploader_test;
