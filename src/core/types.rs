use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::{Result, TransferError};

/// Unique id of one upload, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One in-flight upload.
///
/// `total_bytes` is fixed when the task is created. The byte counter only
/// moves forward and is clamped to `total_bytes`; once it gets there the
/// task is terminal.
#[derive(Debug)]
pub struct UploadTask {
    pub id: UploadId,
    pub file_path: PathBuf,
    pub file_name: String,
    pub total_bytes: u64,
    pub started_at: DateTime<Utc>,
    bytes_transferred: AtomicU64,
    last_activity: Mutex<Instant>,
}

impl UploadTask {
    pub fn new(file_path: PathBuf, file_name: String, total_bytes: u64) -> Self {
        Self {
            id: UploadId::new(),
            file_path,
            file_name,
            total_bytes,
            started_at: Utc::now(),
            bytes_transferred: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Resolve `path` to an absolute regular file and size the task from it.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_path = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| TransferError::FileRead(format!("{}: {}", path.display(), e)))?;
        let metadata = tokio::fs::metadata(&file_path)
            .await
            .map_err(|e| TransferError::FileRead(format!("{}: {}", file_path.display(), e)))?;

        if !metadata.is_file() {
            return Err(TransferError::FileRead(format!("{} is not a regular file", file_path.display())));
        }

        let file_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(String::from)
            .ok_or_else(|| TransferError::FileRead(format!("{} has no usable file name", file_path.display())))?;

        Ok(Self::new(file_path, file_name, metadata.len()))
    }

    /// Account for `bytes` freshly read from the file. Returns the new total.
    pub fn record_read(&self, bytes: u64) -> u64 {
        self.touch();
        let total = self.total_bytes;
        let previous = self
            .bytes_transferred
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(bytes).min(total))
            })
            .unwrap_or(total);
        previous.saturating_add(bytes).min(total)
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_transferred() >= self.total_bytes
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// A progress tick handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Bytes added since the previous tick
    pub increment: u64,
    /// Bytes reported so far, including this tick
    pub position: u64,
    pub total: u64,
}

impl ProgressUpdate {
    pub fn is_final(&self) -> bool {
        self.position >= self.total
    }
}

/// A file the daemon accepted, as returned by the add endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedFile {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Size")]
    pub size: String,
}

/// Normalized view of one pinned object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Type")]
    pub pin_type: String,
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResponse {
    #[serde(default)]
    pub data: Vec<AddedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnpinRequest {
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinsResponse {
    #[serde(default)]
    pub pinned_files: Vec<PinRecord>,
}

/// Error body shared by every proxy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    /// Files pinned before a multi-file add failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<Vec<AddedFile>>,
}

// compile-time Send + Sync checks
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_types() {
        assert_send_sync::<UploadTask>();
        assert_send_sync::<ProgressUpdate>();
        assert_send_sync::<PinRecord>();
    }
};
