use async_trait::async_trait;
use std::fmt::{self, Debug, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Content type attached to every uploaded log file.
pub const GZIP_CONTENT_TYPE: &str = "application/x-gzip";

/// Definite verdict about the remote dependency, delivered once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    Available,
    Unavailable(String),
}

impl DependencyStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, DependencyStatus::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Terminal result of one upload. The transport does not expose its own error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    Failure(String),
    Cancelled,
}

impl UploadOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            UploadOutcome::Success => "success",
            UploadOutcome::Failure(_) => "failure",
            UploadOutcome::Cancelled => "cancelled",
        }
    }
}

impl Display for UploadOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Failure(reason) => write!(f, "failure: {}", reason),
            other => write!(f, "{}", other.as_label()),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Capability to push one local file to remote object storage.
///
/// `upload` may call `on_progress` any number of times and resolves exactly once;
/// that resolution is the completion signal. Implementations should observe `cancel`
/// and resolve with [`UploadOutcome::Cancelled`] when it fires.
#[async_trait]
pub trait RemoteTransport: Debug + Send + Sync {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> UploadOutcome;

    /// Check whether the remote dependency can be used at all in this run.
    async fn probe(&self) -> DependencyStatus;

    /// Short provider label used in logs and metrics.
    fn provider(&self) -> &str;
}
