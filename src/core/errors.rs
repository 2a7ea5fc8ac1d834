use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;
use serde::Serialize;
use thiserror::Error;

/// Stable, user-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // client / transport side
    ConnectTimeout,
    ReadTimeout,
    ConnectionError,
    ChunkedTransferInterrupted,
    PayloadTooLarge,
    ServerError,
    UnclassifiedHttpError,
    StalledTransfer,
    FileReadFailure,
    UnclassifiedNetworkError,
    // proxy side
    DaemonUnreachable,
    UpstreamOperationFailed,
    NotFound,
    InvalidRequest,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ConnectTimeout => "connect timeout",
            ErrorCategory::ReadTimeout => "read timeout",
            ErrorCategory::ConnectionError => "connection refused",
            ErrorCategory::ChunkedTransferInterrupted => "transfer interrupted",
            ErrorCategory::PayloadTooLarge => "file too large",
            ErrorCategory::ServerError => "server error",
            ErrorCategory::UnclassifiedHttpError => "http error",
            ErrorCategory::StalledTransfer => "stalled transfer",
            ErrorCategory::FileReadFailure => "file read failure",
            ErrorCategory::UnclassifiedNetworkError => "network error",
            ErrorCategory::DaemonUnreachable => "daemon unreachable",
            ErrorCategory::UpstreamOperationFailed => "upstream operation failed",
            ErrorCategory::NotFound => "not found",
            ErrorCategory::InvalidRequest => "invalid request",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, ready to be shown to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub message: String,
    pub http_status: Option<u16>,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Marker wrapped around I/O errors raised by the upload source while the
/// request body is being streamed, so the transport can tell them apart
/// from socket failures once reqwest has wrapped them.
#[derive(Error, Debug)]
#[error("file read failure during transfer: {source}")]
pub struct FileReadError {
    #[source]
    source: io::Error,
}

impl FileReadError {
    pub fn into_io(source: io::Error) -> io::Error {
        io::Error::other(FileReadError { source })
    }
}

/// Client side transfer failures.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Timed out connecting to the pinning service: {0}")]
    ConnectTimeout(String),

    #[error("Timed out waiting for the pinning service: {0}")]
    ReadTimeout(String),

    #[error("Could not connect to the pinning service: {0}")]
    Connection(String),

    #[error("Transfer interrupted: {0}")]
    ChunkedTransferInterrupted(String),

    #[error("File too large (HTTP {status_code}): {message}")]
    PayloadTooLarge {
        status_code: u16,
        message: String,
    },

    #[error("Server error (HTTP {status_code}): {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("HTTP {status_code}: {message}")]
    UnclassifiedHttp {
        status_code: u16,
        message: String,
    },

    #[error("Transfer stalled: no data read for {}s", idle.as_secs())]
    StalledTransfer {
        idle: Duration,
    },

    #[error("File read failure: {0}")]
    FileRead(String),

    #[error("Network error: {0}")]
    UnclassifiedNetwork(String),
}

impl TransferError {
    /// Classify a non-2xx response. `body` is the raw response text; a JSON
    /// `detail` field is preferred when present.
    pub fn from_status(status_code: u16, body: &str) -> Self {
        let message = extract_detail(body);
        match status_code {
            413 => Self::PayloadTooLarge { status_code, message },
            500..=599 => Self::ServerError { status_code, message },
            _ => Self::UnclassifiedHttp { status_code, message },
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(read_err) = find_file_read_error(&err) {
            return Self::FileRead(read_err.to_string());
        }

        let message = describe(&err);
        if err.is_timeout() {
            if err.is_connect() {
                Self::ConnectTimeout(message)
            } else {
                Self::ReadTimeout(message)
            }
        } else if err.is_connect() {
            Self::Connection(message)
        } else if err.is_body() || is_interrupted(&err) {
            Self::ChunkedTransferInterrupted(message)
        } else if err.is_decode() {
            Self::UnclassifiedNetwork(format!("invalid response from the pinning service: {}", message))
        } else {
            Self::UnclassifiedNetwork(message)
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectTimeout(_) => ErrorCategory::ConnectTimeout,
            Self::ReadTimeout(_) => ErrorCategory::ReadTimeout,
            Self::Connection(_) => ErrorCategory::ConnectionError,
            Self::ChunkedTransferInterrupted(_) => ErrorCategory::ChunkedTransferInterrupted,
            Self::PayloadTooLarge { .. } => ErrorCategory::PayloadTooLarge,
            Self::ServerError { .. } => ErrorCategory::ServerError,
            Self::UnclassifiedHttp { .. } => ErrorCategory::UnclassifiedHttpError,
            Self::StalledTransfer { .. } => ErrorCategory::StalledTransfer,
            Self::FileRead(_) => ErrorCategory::FileReadFailure,
            Self::UnclassifiedNetwork(_) => ErrorCategory::UnclassifiedNetworkError,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::PayloadTooLarge { status_code, .. }
            | Self::ServerError { status_code, .. }
            | Self::UnclassifiedHttp { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            category: self.category(),
            message: self.to_string(),
            http_status: self.status_code(),
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        Self::FileRead(err.to_string())
    }
}

impl From<TransferError> for ErrorReport {
    fn from(err: TransferError) -> Self {
        err.report()
    }
}

/// Pulls the `detail` field out of an error body, falling back to the raw text.
pub fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.trim().to_string(),
        },
        _ => body.trim().to_string(),
    }
}

fn sources<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn StdError + 'static)| (*e).source())
}

fn find_file_read_error(err: &reqwest::Error) -> Option<&FileReadError> {
    sources(err).find_map(|e| {
        if let Some(found) = e.downcast_ref::<FileReadError>() {
            return Some(found);
        }
        // io::Error::source() skips the wrapped payload, look inside explicitly
        e.downcast_ref::<io::Error>()
            .and_then(|io_err| io_err.get_ref())
            .and_then(|inner| inner.downcast_ref::<FileReadError>())
    })
}

fn is_interrupted(err: &reqwest::Error) -> bool {
    sources(err).any(|e| {
        e.downcast_ref::<io::Error>().is_some_and(|io_err| {
            matches!(
                io_err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            )
        })
    })
}

// reqwest's Display hides the cause, which is usually the useful part.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    if let Some(cause) = sources(err).skip(1).last() {
        message.push_str(": ");
        message.push_str(&cause.to_string());
    }
    message
}

/// Error alias
pub type Result<T, E = TransferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = TransferError::from_status(413, r#"{"detail": "too big"}"#);
        assert_eq!(err.category(), ErrorCategory::PayloadTooLarge);
        assert_eq!(err.status_code(), Some(413));
        assert!(err.to_string().contains("too big"));

        let err = TransferError::from_status(503, r#"{"detail": "Is the IPFS daemon running?"}"#);
        assert_eq!(err.category(), ErrorCategory::ServerError);
        assert_eq!(err.status_code(), Some(503));

        let err = TransferError::from_status(404, "not here");
        assert_eq!(err.category(), ErrorCategory::UnclassifiedHttpError);
        assert!(err.to_string().contains("not here"));
    }

    #[test]
    fn test_extract_detail_falls_back_to_text() {
        assert_eq!(extract_detail(r#"{"detail": "boom"}"#), "boom");
        assert_eq!(extract_detail(r#"{"message": "x"}"#), r#"{"message": "x"}"#);
        assert_eq!(extract_detail("plain failure\n"), "plain failure");
        assert_eq!(extract_detail(r#"{"detail": {"code": 1}}"#), r#"{"code":1}"#);
    }

    #[test]
    fn test_report_carries_category_and_status() {
        let report = TransferError::from_status(502, "bad gateway").report();
        assert_eq!(report.category, ErrorCategory::ServerError);
        assert_eq!(report.http_status, Some(502));
        assert!(report.to_string().starts_with("[server error]"));

        let report = ErrorReport::from(TransferError::StalledTransfer { idle: Duration::from_secs(31) });
        assert_eq!(report.category, ErrorCategory::StalledTransfer);
        assert_eq!(report.http_status, None);
        assert!(report.message.contains("31s"));
    }

    #[test]
    fn test_file_read_marker_survives_io_wrapping() {
        let wrapped = FileReadError::into_io(io::Error::new(io::ErrorKind::Other, "disk gone"));
        let inner = wrapped.get_ref().and_then(|e| e.downcast_ref::<FileReadError>());
        assert!(inner.is_some());
        assert!(wrapped.to_string().contains("disk gone"));
    }
}
