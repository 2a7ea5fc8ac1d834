use std::io;
use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use crate::config::ClientConfig;
use crate::core::{
    AddResponse, AddedFile, MessageResponse, PinRecord, PinService, PinsResponse, ProgressSink, Result,
    TransferError, UnpinRequest, UploadTask,
};
use crate::progress::StallWatchdog;
use super::multipart::{FileEncoder, MultipartEncoder};

/// HTTP client for the pin registry proxy.
///
/// The connect timeout bounds session setup, the read timeout bounds the
/// whole exchange. Uploads are additionally guarded by a stall watchdog.
#[derive(Debug, Clone)]
pub struct PinClient {
    client: Client,
    config: ClientConfig,
}

impl PinClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(TransferError::from_reqwest)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Upload the file at `path`. Convenience over [`PinClient::upload_task`].
    pub async fn upload_file(&self, path: &Path, sink: Arc<dyn ProgressSink>) -> Result<Vec<AddedFile>> {
        let task = Arc::new(UploadTask::from_path(path).await?);
        self.upload_task(task, sink).await
    }

    pub async fn upload_task(&self, task: Arc<UploadTask>, sink: Arc<dyn ProgressSink>) -> Result<Vec<AddedFile>> {
        let encoder = FileEncoder::open(task.clone(), self.config.chunk_size, sink).await?;
        self.send_encoded(task, encoder).await
    }

    /// POST an encoded body to the add endpoint.
    ///
    /// The request future is raced against the stall watchdog; losing the
    /// race drops the request, which closes the connection and the file.
    pub async fn send_encoded<S>(&self, task: Arc<UploadTask>, encoder: MultipartEncoder<S>) -> Result<Vec<AddedFile>>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let url = self.endpoint("add");
        tracing::info!(
            upload_id = %task.id,
            file = %task.file_name,
            bytes = task.total_bytes,
            %url,
            "starting upload"
        );

        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, encoder.content_type())
            .header(CONTENT_LENGTH, encoder.content_length())
            .body(Body::wrap_stream(encoder));

        task.touch();
        let watchdog = StallWatchdog::spawn(task.clone(), self.config.stall_timeout);

        let response = tokio::select! {
            result = request.send() => result.map_err(TransferError::from_reqwest),
            _ = watchdog.stalled() => Err(TransferError::StalledTransfer { idle: task.idle_for() }),
        };
        drop(watchdog);

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    upload_id = %task.id,
                    category = %e.category(),
                    sent = task.bytes_transferred(),
                    "upload failed: {}",
                    e
                );
                return Err(e);
            }
        };

        let body: AddResponse = Self::parse(response).await?;
        tracing::info!(upload_id = %task.id, files = body.data.len(), "upload accepted");
        Ok(body.data)
    }

    pub async fn unpin(&self, hash: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("unpin"))
            .json(&UnpinRequest { hash: hash.to_string() })
            .send()
            .await
            .map_err(TransferError::from_reqwest)?;

        let body: MessageResponse = Self::parse(response).await?;
        Ok(body.message)
    }

    pub async fn list(&self) -> Result<Vec<PinRecord>> {
        let response = self
            .client
            .get(self.endpoint("pins"))
            .send()
            .await
            .map_err(TransferError::from_reqwest)?;

        let body: PinsResponse = Self::parse(response).await?;
        Ok(body.pinned_files)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %text, "pinning service returned an error");
            return Err(TransferError::from_status(status.as_u16(), &text));
        }
        response.json().await.map_err(TransferError::from_reqwest)
    }
}

#[async_trait]
impl PinService for PinClient {
    async fn upload(&self, task: Arc<UploadTask>, sink: Arc<dyn ProgressSink>) -> Result<Vec<AddedFile>> {
        self.upload_task(task, sink).await
    }

    async fn unpin(&self, hash: &str) -> Result<String> {
        PinClient::unpin(self, hash).await
    }

    async fn list(&self) -> Result<Vec<PinRecord>> {
        PinClient::list(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures::StreamExt;
    use serde_json::json;
    use tokio::sync::mpsc;
    use crate::core::{ErrorCategory, NoProgress, ProgressUpdate};
    use crate::test_utils::TestServer;

    fn config_for(server: &TestServer) -> ClientConfig {
        ClientConfig {
            base_url: server.url("/api/v2"),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(5),
            stall_timeout: Duration::from_millis(300),
            chunk_size: 8 * 1024,
            ..ClientConfig::default()
        }
    }

    async fn echo_add(mut multipart: Multipart) -> Json<serde_json::Value> {
        let mut data = Vec::new();
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.file_name().unwrap_or_default().to_string();
            let Ok(bytes) = field.bytes().await else { break };
            data.push(json!({"Name": name, "Hash": "Qm123", "Size": bytes.len().to_string()}));
        }
        Json(json!({ "data": data }))
    }

    #[tokio::test]
    async fn test_upload_streams_file_and_reports_progress() {
        let server = TestServer::new(Router::new().route("/api/v2/add", post(echo_add))).await;
        let client = PinClient::new(config_for(&server)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        tokio::fs::write(&path, vec![42u8; 300_000]).await.unwrap();

        let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(1024);
        let files = client.upload_file(&path, Arc::new(tx)).await.unwrap();

        assert_eq!(files, vec![AddedFile { name: "f.bin".into(), hash: "Qm123".into(), size: "300000".into() }]);

        let mut last = 0;
        while let Ok(update) = rx.try_recv() {
            assert!(update.position >= last);
            last = update.position;
        }
        assert_eq!(last, 300_000);
    }

    #[tokio::test]
    async fn test_status_codes_are_classified() {
        let router = Router::new()
            .route("/api/v2/add", post(|| async {
                (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({"detail": "File too large"})))
            }))
            .route("/api/v2/pins", get(|| async {
                (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"detail": "daemon down"})))
            }))
            .route("/api/v2/unpin", post(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }));
        let server = TestServer::new(router).await;
        let client = PinClient::new(config_for(&server)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        tokio::fs::write(&path, vec![0u8; 1000]).await.unwrap();

        let err = client.upload_file(&path, Arc::new(NoProgress)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::PayloadTooLarge);
        assert_eq!(err.status_code(), Some(413));

        let err = client.list().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ServerError);
        assert!(err.to_string().contains("daemon down"));

        let err = client.unpin("Qm1").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UnclassifiedHttpError);
        assert!(err.to_string().contains("short and stout"));
    }

    #[tokio::test]
    async fn test_stalled_source_is_aborted() {
        let server = TestServer::new(Router::new().route("/api/v2/add", post(echo_add))).await;
        let client = PinClient::new(config_for(&server)).unwrap();

        let task = Arc::new(UploadTask::new("/tmp/stuck.bin".into(), "stuck.bin".into(), 1_000_000));
        let first: io::Result<Bytes> = Ok(Bytes::from(vec![1u8; 1000]));
        let source = futures::stream::iter(vec![first]).chain(futures::stream::pending::<io::Result<Bytes>>());
        let source = crate::progress::ProgressStream::new(source, task.clone(), Arc::new(NoProgress));
        let encoder = MultipartEncoder::new(source, "stuck.bin", 1_000_000);

        let started = std::time::Instant::now();
        let err = client.send_encoded(task.clone(), encoder).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StalledTransfer);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(task.bytes_transferred(), 1000);
    }

    #[tokio::test]
    async fn test_read_failure_mid_upload_is_file_read_failure() {
        let server = TestServer::new(Router::new().route("/api/v2/add", post(echo_add))).await;
        let client = PinClient::new(config_for(&server)).unwrap();

        let task = Arc::new(UploadTask::new("/tmp/flaky.bin".into(), "flaky.bin".into(), 64 * 1024));
        let source: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from(vec![3u8; 16 * 1024])),
            Err(io::Error::new(io::ErrorKind::Other, "input/output error")),
        ];
        let source = crate::progress::ProgressStream::new(futures::stream::iter(source), task.clone(), Arc::new(NoProgress));
        let encoder = MultipartEncoder::new(source, "flaky.bin", 64 * 1024);

        let err = client.send_encoded(task, encoder).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::FileReadFailure, "{}", err);
        assert!(err.to_string().contains("input/output error"));
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_connection_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PinClient::new(ClientConfig {
            base_url: format!("http://{}/api/v2", addr),
            ..ClientConfig::default()
        }).unwrap();

        let err = client.list().await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConnectionError);
    }

    #[tokio::test]
    async fn test_missing_file_is_file_read_failure() {
        let client = PinClient::new(ClientConfig::default()).unwrap();
        let err = client
            .upload_file(Path::new("/definitely/not/here.bin"), Arc::new(NoProgress))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::FileReadFailure);
    }
}
