use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

/// Extension of a file that is ready to upload.
pub const READY_EXTENSION: &str = "gz";
/// Marker appended to a ready name after a failed upload.
pub const DEFERRED_EXTENSION: &str = "tmp";
/// Marker of a file still being materialized by a producer.
pub const WRITING_EXTENSION: &str = "part";

/// `YYYYMMDDHHMMSS`, second granularity, always 14 characters.
pub const DATE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// A single structured log record as persisted in the queue.
///
/// `sequence` is process-local and restarts at 0 on every process start, so the
/// on-disk identity of a record is the pair `(date_time, sequence)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub date_time: String,
    pub sequence: u64,
    // Opaque, application-defined payload
    pub inner_object: serde_json::Value,
}

impl LogRecord {
    pub fn new(sequence: u64, captured_at: DateTime<Utc>, inner_object: serde_json::Value) -> Self {
        Self {
            date_time: captured_at.format(DATE_TIME_FORMAT).to_string(),
            sequence,
            inner_object,
        }
    }

    /// Build a record stamped with the current wall-clock time.
    pub fn capture(sequence: u64, inner_object: serde_json::Value) -> Self {
        Self::new(sequence, Utc::now(), inner_object)
    }

    /// Ready file name for this record: `{date_time}_{sequence}.gz`.
    pub fn ready_name(&self) -> String {
        format!("{}_{}.{}", self.date_time, self.sequence, READY_EXTENSION)
    }
}

/// Payload produced by the sample host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePayload {
    pub dummy_string: String,
    pub test_flag: i32,
}

impl SamplePayload {
    pub fn random() -> Self {
        Self {
            dummy_string: "blahblah".to_string(),
            test_flag: rand::thread_rng().gen_range(0..100),
        }
    }
}

/// The unit managed by the durable queue, always addressed by its ready name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueItem {
    name: String,
    path: PathBuf,
}

impl QueueItem {
    pub fn new(dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = dir.join(&name);
        Self { name, path }
    }

    pub fn for_record(dir: &Path, record: &LogRecord) -> Self {
        Self::new(dir, record.ready_name())
    }

    /// Accepts a directory entry name only if it carries exactly the ready extension.
    pub fn from_ready_name(dir: &Path, name: &str) -> Option<Self> {
        let stem = name.strip_suffix(&format!(".{}", READY_EXTENSION))?;
        if stem.is_empty() {
            return None;
        }
        Some(Self::new(dir, name))
    }

    /// Maps a deferred entry name (`*.gz.tmp`) back to the item it belongs to.
    pub fn from_deferred_name(dir: &Path, name: &str) -> Option<Self> {
        let ready = name.strip_suffix(&format!(".{}", DEFERRED_EXTENSION))?;
        Self::from_ready_name(dir, ready)
    }

    /// Maps a writing entry name (`*.gz.part`) back to the item it belongs to.
    pub fn from_writing_name(dir: &Path, name: &str) -> Option<Self> {
        let ready = name.strip_suffix(&format!(".{}", WRITING_EXTENSION))?;
        Self::from_ready_name(dir, ready)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn deferred_name(&self) -> String {
        format!("{}.{}", self.name, DEFERRED_EXTENSION)
    }

    pub fn deferred_path(&self) -> PathBuf {
        self.path.with_file_name(self.deferred_name())
    }

    pub fn writing_name(&self) -> String {
        format!("{}.{}", self.name, WRITING_EXTENSION)
    }

    pub fn writing_path(&self) -> PathBuf {
        self.path.with_file_name(self.writing_name())
    }

    /// Remote object key: `{remote_root}/{name}`, never the deferred name.
    pub fn remote_path(&self, remote_root: &str) -> String {
        let root = remote_root.trim_matches('/');
        if root.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", root, self.name)
        }
    }
}

impl Display for QueueItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
