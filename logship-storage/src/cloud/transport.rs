use async_trait::async_trait;
use logship_core::{
    DependencyStatus, ProgressCallback, RemoteTransport, ShipperError, UploadOutcome,
    UploadProgress, UploadRequest,
};
use opendal::Operator;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cloud::storage_config::BackendConfig;

/// Default size of one streamed write.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// [`RemoteTransport`] backed by an OpenDAL operator (memory, fs, s3, gcs).
///
/// The local file is streamed through a writer in `chunk_size` pieces, reporting
/// progress after each piece. Cancellation is checked between pieces and aborts the writer.
#[derive(Debug, Clone)]
pub struct ObjectStoreTransport {
    op: Operator,
    provider: &'static str,
    chunk_size: usize,
}

impl ObjectStoreTransport {
    pub fn new(cfg: BackendConfig) -> Result<Self, ShipperError> {
        let op = cfg.build_operator()?;
        Ok(Self {
            op,
            provider: cfg.provider(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Read back a stored object, relative to the backend root.
    pub async fn read_object(&self, path: &str) -> Result<Vec<u8>, ShipperError> {
        let key = path.trim_matches('/');
        let data = self
            .op
            .read(key)
            .await
            .map_err(|e| ShipperError::Remote(format!("read object {}: {}", key, e)))?;
        Ok(data.to_vec())
    }

    async fn put_file(
        &self,
        request: &UploadRequest,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, String> {
        let data = tokio::fs::read(&request.local_path)
            .await
            .map_err(|e| format!("read {}: {}", request.local_path.display(), e))?;
        let total = data.len() as u64;
        let key = request.remote_path.trim_matches('/');

        let mut open = self.op.writer_with(key);
        if self.op.info().full_capability().write_with_content_type {
            open = open.content_type(&request.content_type);
        }
        let mut writer = open
            .await
            .map_err(|e| format!("open writer {}: {}", key, e))?;

        let mut sent: u64 = 0;
        on_progress(UploadProgress {
            bytes_transferred: 0,
            total_bytes: total,
        });
        for chunk in data.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                if let Err(e) = writer.abort().await {
                    warn!(target = "transport", key = %key, error = %e, "abort writer failed");
                }
                return Ok(UploadOutcome::Cancelled);
            }
            writer
                .write(chunk.to_vec())
                .await
                .map_err(|e| format!("write {}: {}", key, e))?;
            sent += chunk.len() as u64;
            on_progress(UploadProgress {
                bytes_transferred: sent,
                total_bytes: total,
            });
        }
        writer
            .close()
            .await
            .map_err(|e| format!("close {}: {}", key, e))?;
        debug!(target = "transport", key = %key, size = total, "object stored");
        Ok(UploadOutcome::Success)
    }
}

#[async_trait]
impl RemoteTransport for ObjectStoreTransport {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        match self.put_file(&request, &on_progress, &cancel).await {
            Ok(outcome) => outcome,
            Err(reason) => UploadOutcome::Failure(reason),
        }
    }

    async fn probe(&self) -> DependencyStatus {
        match self.op.check().await {
            Ok(()) => DependencyStatus::Available,
            Err(e) => {
                warn!(target = "transport", provider = self.provider, error = %e, "object store check failed");
                DependencyStatus::Unavailable(e.to_string())
            }
        }
    }

    fn provider(&self) -> &str {
        self.provider
    }
}
