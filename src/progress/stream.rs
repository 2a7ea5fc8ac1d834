use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::{ProgressSink, UploadTask};
use super::accountant::ProgressAccountant;

pin_project! {
    /// Counts bytes as they are pulled from `inner`, updating the task's
    /// activity clock and feeding the accountant. Purely observational:
    /// items pass through untouched.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        task: Arc<UploadTask>,
        accountant: ProgressAccountant,
        sink: Arc<dyn ProgressSink>,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, task: Arc<UploadTask>, sink: Arc<dyn ProgressSink>) -> Self {
        let accountant = ProgressAccountant::new(task.total_bytes);
        Self { inner, task, accountant, sink }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let bytes_len = chunk.len() as u64;
                if bytes_len > 0 {
                    this.task.record_read(bytes_len);
                    this.accountant.record(bytes_len, this.sink.as_ref());
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.accountant.finish(this.sink.as_ref());
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use crate::core::ProgressUpdate;

    #[tokio::test]
    async fn test_stream_reports_through_bounded_channel() {
        let total = 20_000u64;
        let task = Arc::new(UploadTask::new(PathBuf::from("/tmp/x"), "x".into(), total));
        let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(256);

        let chunks: Vec<std::io::Result<Bytes>> = (0..20)
            .map(|_| Ok(Bytes::from(vec![1u8; 1000])))
            .collect();
        let mut stream = ProgressStream::new(futures::stream::iter(chunks), task.clone(), Arc::new(tx));

        let mut seen = 0usize;
        while let Some(chunk) = stream.next().await {
            seen += chunk.unwrap().len();
        }
        drop(stream);

        assert_eq!(seen as u64, total);
        assert!(task.is_complete());

        let mut positions = Vec::new();
        while let Some(update) = rx.recv().await {
            positions.push(update.position);
        }
        assert_eq!(positions.last(), Some(&total));
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_errors_pass_through_without_counting() {
        let task = Arc::new(UploadTask::new(PathBuf::from("/tmp/x"), "x".into(), 10));
        let items: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
        ];
        let mut stream = ProgressStream::new(futures::stream::iter(items), task.clone(), Arc::new(crate::core::NoProgress));

        assert_eq!(stream.next().await.unwrap().unwrap().len(), 3);
        assert!(stream.next().await.unwrap().is_err());
        assert_eq!(task.bytes_transferred(), 3);
    }
}
