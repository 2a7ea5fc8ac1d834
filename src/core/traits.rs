use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use super::errors::Result;
use super::types::{AddedFile, PinRecord, ProgressUpdate, UploadTask};

/// Receives progress ticks from the upload read path.
///
/// Implementations must not block: the caller is the body stream that
/// feeds the socket.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

/// Bounded channel sink. A full channel drops the tick instead of stalling
/// the transfer; every tick carries the absolute position so the renderer
/// catches up on the next one.
impl ProgressSink for mpsc::Sender<ProgressUpdate> {
    fn on_progress(&self, update: ProgressUpdate) {
        let _ = self.try_send(update);
    }
}

/// Sink for callers that do not render progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _update: ProgressUpdate) {}
}

/// Operations the command surface needs from the pinning service.
#[async_trait]
pub trait PinService: Send + Sync {
    /// Stream one file to the add endpoint.
    async fn upload(&self, task: Arc<UploadTask>, sink: Arc<dyn ProgressSink>) -> Result<Vec<AddedFile>>;

    /// Unpin `hash`, returning the service's confirmation message.
    async fn unpin(&self, hash: &str) -> Result<String>;

    /// Current pin set.
    async fn list(&self) -> Result<Vec<PinRecord>>;
}
