use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;
use crate::core::{FileReadError, ProgressSink, Result, TransferError, UploadTask};
use crate::progress::ProgressStream;

/// Form field the proxy reads uploads from.
pub const FILES_FIELD: &str = "files";
pub const FILE_CONTENT_TYPE: &str = "application/octet-stream";
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Encoder over an open upload file.
pub type FileEncoder = MultipartEncoder<ProgressStream<ReaderStream<File>>>;

pin_project! {
    /// Lazily produces a `multipart/form-data` body holding a single file
    /// part. The file bytes are pulled from `inner` only when the body is
    /// polled, so memory use is bounded by the chunk size.
    pub struct MultipartEncoder<S> {
        #[pin]
        inner: S,
        boundary: String,
        head: Option<Bytes>,
        tail: Option<Bytes>,
        content_length: u64,
        // file bytes still owed against the declared length
        remaining: u64,
        body_done: bool,
    }
}

impl FileEncoder {
    /// Open `task.file_path` and wrap it in progress accounting.
    pub async fn open(task: Arc<UploadTask>, chunk_size: usize, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let file = File::open(&task.file_path)
            .await
            .map_err(|e| TransferError::FileRead(format!("{}: {}", task.file_path.display(), e)))?;
        let reader = ReaderStream::with_capacity(file, chunk_size.max(1));
        let file_name = task.file_name.clone();
        let total_bytes = task.total_bytes;

        Ok(MultipartEncoder::new(
            ProgressStream::new(reader, task, sink),
            &file_name,
            total_bytes,
        ))
    }
}

impl<S> MultipartEncoder<S> {
    /// `body_len` is the exact number of bytes `inner` will yield.
    pub fn new(inner: S, file_name: &str, body_len: u64) -> Self {
        Self::with_boundary(inner, file_name, body_len, format!("bunker-{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(inner: S, file_name: &str, body_len: u64, boundary: String) -> Self {
        let head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{FILES_FIELD}\"; filename=\"{}\"\r\nContent-Type: {FILE_CONTENT_TYPE}\r\n\r\n",
            escape_file_name(file_name),
        );
        let tail = format!("\r\n--{boundary}--\r\n");
        let content_length = head.len() as u64 + body_len + tail.len() as u64;

        Self {
            inner,
            boundary,
            head: Some(Bytes::from(head)),
            tail: Some(Bytes::from(tail)),
            content_length,
            remaining: body_len,
            body_done: false,
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }
}

impl<S> MultipartEncoder<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    /// Next piece of the body; an empty buffer means the body is complete.
    pub async fn next_chunk(&mut self) -> io::Result<Bytes> {
        match self.next().await {
            Some(item) => item,
            None => Ok(Bytes::new()),
        }
    }
}

impl<S> Stream for MultipartEncoder<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if let Some(head) = this.head.take() {
            return Poll::Ready(Some(Ok(head)));
        }

        while !*this.body_done {
            let failure = match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) if chunk.is_empty() => continue,
                Poll::Ready(Some(Ok(chunk))) => {
                    let len = chunk.len() as u64;
                    if len <= *this.remaining {
                        *this.remaining -= len;
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    io::Error::new(io::ErrorKind::InvalidData, "file grew while it was being uploaded")
                }
                Poll::Ready(Some(Err(e))) => e,
                Poll::Ready(None) if *this.remaining > 0 => io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file shrank while it was being uploaded, {} bytes missing", this.remaining),
                ),
                Poll::Ready(None) => {
                    *this.body_done = true;
                    break;
                }
                Poll::Pending => return Poll::Pending,
            };

            *this.body_done = true;
            this.tail.take();
            return Poll::Ready(Some(Err(FileReadError::into_io(failure))));
        }

        Poll::Ready(this.tail.take().map(Ok))
    }
}

fn escape_file_name(name: &str) -> String {
    name.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn collect_body(items: Vec<io::Result<Bytes>>, name: &str, len: u64) -> (u64, Vec<u8>) {
        let encoder = MultipartEncoder::with_boundary(stream::iter(items), name, len, "XyZ".into());
        let declared = encoder.content_length();
        let body = futures::executor::block_on(async move {
            let mut encoder = encoder;
            let mut out = Vec::new();
            loop {
                let chunk = encoder.next_chunk().await.unwrap();
                if chunk.is_empty() {
                    break;
                }
                out.extend_from_slice(&chunk);
            }
            out
        });
        (declared, body)
    }

    #[test]
    fn test_body_layout_and_length() {
        let items = vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let (declared, body) = collect_body(items, "f.bin", 11);

        let expected = "--XyZ\r\n\
            Content-Disposition: form-data; name=\"files\"; filename=\"f.bin\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n\
            hello world\r\n--XyZ--\r\n";
        assert_eq!(String::from_utf8(body.clone()).unwrap(), expected);
        assert_eq!(declared, body.len() as u64);
    }

    #[test]
    fn test_empty_file_still_has_framing() {
        let (declared, body) = collect_body(vec![], "empty", 0);
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--XyZ\r\n"));
        assert!(text.ends_with("\r\n\r\n\r\n--XyZ--\r\n"));
        assert_eq!(declared, text.len() as u64);
    }

    #[test]
    fn test_quotes_in_file_name_are_escaped() {
        let (_, body) = collect_body(vec![], "a\"b\r\n.txt", 0);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("filename=\"a%22b%0D%0A.txt\""));
    }

    #[test]
    fn test_read_failure_is_marked_and_ends_body() {
        let items = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::Other, "disk unplugged")),
        ];
        let mut encoder = MultipartEncoder::new(stream::iter(items), "f", 10);
        futures::executor::block_on(async {
            assert!(!encoder.next_chunk().await.unwrap().is_empty()); // head
            assert_eq!(&encoder.next_chunk().await.unwrap()[..], b"abc");
            let err = encoder.next_chunk().await.unwrap_err();
            assert!(err.get_ref().and_then(|e| e.downcast_ref::<FileReadError>()).is_some());
            assert!(encoder.next_chunk().await.unwrap().is_empty());
        });
    }

    fn drain(items: Vec<io::Result<Bytes>>, len: u64) -> (Vec<u8>, io::Error) {
        let mut encoder = MultipartEncoder::with_boundary(stream::iter(items), "f", len, "XyZ".into());
        futures::executor::block_on(async {
            encoder.next_chunk().await.unwrap(); // head
            let mut body = Vec::new();
            loop {
                match encoder.next_chunk().await {
                    Ok(chunk) if chunk.is_empty() => panic!("body ended without an error"),
                    Ok(chunk) => body.extend_from_slice(&chunk),
                    Err(e) => {
                        assert!(encoder.next_chunk().await.unwrap().is_empty());
                        return (body, e);
                    }
                }
            }
        })
    }

    #[test]
    fn test_source_longer_than_declared_fails_as_read_error() {
        let (body, err) = drain(vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"defgh"))], 5);
        assert_eq!(body, b"abc");
        assert!(err.get_ref().and_then(|e| e.downcast_ref::<FileReadError>()).is_some());
        assert!(err.to_string().contains("grew"));
    }

    #[test]
    fn test_source_shorter_than_declared_fails_as_read_error() {
        let (body, err) = drain(vec![Ok(Bytes::from_static(b"abcde"))], 8);
        assert_eq!(body, b"abcde");
        assert!(err.get_ref().and_then(|e| e.downcast_ref::<FileReadError>()).is_some());
        assert!(err.to_string().contains("3 bytes missing"));
    }

    #[tokio::test]
    async fn test_open_streams_file_in_requested_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, vec![7u8; 10_000]).await.unwrap();

        let task = Arc::new(UploadTask::from_path(&path).await.unwrap());
        let mut encoder = FileEncoder::open(task.clone(), 1024, Arc::new(crate::core::NoProgress)).await.unwrap();
        let declared = encoder.content_length();

        let mut total = 0u64;
        let mut largest = 0usize;
        loop {
            let chunk = encoder.next_chunk().await.unwrap();
            if chunk.is_empty() {
                break;
            }
            total += chunk.len() as u64;
            largest = largest.max(chunk.len());
        }

        assert_eq!(total, declared);
        assert!(largest <= 1024);
        assert_eq!(task.bytes_transferred(), 10_000);
        assert!(encoder.content_type().starts_with("multipart/form-data; boundary=bunker-"));
    }
}
