use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use logship_core::{LogRecord, ShipperError};
use std::io::{Read, Write};

/// Initial capacity of the reusable JSON scratch buffer.
pub const SCRATCH_CAPACITY: usize = 5000;

/// Serializer/compressor for log records.
///
/// Each call produces one self-contained gzip member wrapping the UTF-8 JSON of the
/// record. The JSON is staged in a scratch buffer that is reused across calls and
/// cleared before every call, so only bytes produced by the current call are compressed.
#[derive(Debug)]
pub struct RecordCodec {
    scratch: Vec<u8>,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCodec {
    pub fn new() -> Self {
        Self {
            scratch: Vec::with_capacity(SCRATCH_CAPACITY),
        }
    }

    pub fn encode(&mut self, record: &LogRecord) -> Result<Vec<u8>, ShipperError> {
        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, record)?;

        let mut encoder = GzEncoder::new(
            Vec::with_capacity(self.scratch.len() / 2 + 32),
            Compression::default(),
        );
        encoder
            .write_all(&self.scratch)
            .map_err(|e| ShipperError::Serialization(format!("gzip write failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| ShipperError::Serialization(format!("gzip finish failed: {}", e)))
    }

    /// Bytes staged by the most recent `encode` call.
    pub fn last_json(&self) -> &[u8] {
        &self.scratch
    }

    pub fn decode(bytes: &[u8]) -> Result<LogRecord, ShipperError> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| ShipperError::Serialization(format!("gzip read failed: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }
}
