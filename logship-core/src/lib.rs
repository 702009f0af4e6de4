pub mod errors;
pub mod record;
pub mod transport;

pub use errors::ShipperError;
pub use record::{LogRecord, QueueItem, SamplePayload};
pub use transport::{
    DependencyStatus, ProgressCallback, RemoteTransport, UploadOutcome, UploadProgress,
    UploadRequest,
};
