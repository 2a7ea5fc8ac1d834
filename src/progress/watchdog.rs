use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use crate::core::UploadTask;

const MIN_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_secs(1);

/// Watches an upload's activity clock and trips once nothing has been read
/// for `threshold`. Stops watching when the task reaches its total size,
/// since the remaining wait is bounded by the transport's read timeout.
pub struct StallWatchdog {
    stalled: CancellationToken,
    handle: JoinHandle<()>,
}

impl StallWatchdog {
    pub fn spawn(task: Arc<UploadTask>, threshold: Duration) -> Self {
        let stalled = CancellationToken::new();
        let trip = stalled.clone();
        let period = (threshold / 4).clamp(MIN_POLL, MAX_POLL);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if task.is_complete() {
                    break;
                }
                let idle = task.idle_for();
                if idle >= threshold {
                    tracing::warn!(
                        upload_id = %task.id,
                        idle_ms = idle.as_millis() as u64,
                        bytes = task.bytes_transferred(),
                        "upload stalled"
                    );
                    trip.cancel();
                    break;
                }
            }
        });

        Self { stalled, handle }
    }

    /// Resolves when the stall threshold is crossed. Never resolves if the
    /// upload finishes first.
    pub fn stalled(&self) -> WaitForCancellationFuture<'_> {
        self.stalled.cancelled()
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.is_cancelled()
    }
}

impl Drop for StallWatchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn task(total: u64) -> Arc<UploadTask> {
        Arc::new(UploadTask::new(PathBuf::from("/tmp/w"), "w".into(), total))
    }

    #[tokio::test]
    async fn test_trips_when_idle() {
        let task = task(100);
        let watchdog = StallWatchdog::spawn(task.clone(), Duration::from_millis(50));
        tokio::time::timeout(Duration::from_secs(2), watchdog.stalled())
            .await
            .expect("watchdog should trip");
        assert!(watchdog.is_stalled());
    }

    #[tokio::test]
    async fn test_activity_keeps_it_quiet() {
        let task = task(1_000_000);
        let watchdog = StallWatchdog::spawn(task.clone(), Duration::from_millis(150));
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            task.record_read(10);
        }
        assert!(!watchdog.is_stalled());
    }

    #[tokio::test]
    async fn test_completed_task_never_trips() {
        let task = task(10);
        task.record_read(10);
        let watchdog = StallWatchdog::spawn(task.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!watchdog.is_stalled());
    }
}
