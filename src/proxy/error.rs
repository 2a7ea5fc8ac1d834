use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use crate::core::{AddedFile, ErrorBody, ErrorCategory, ErrorReport};

/// Proxy side failures. Each maps to exactly one status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("{0}")]
    DaemonUnreachable(String),

    #[error("{0}")]
    UpstreamOperationFailed(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),
}

impl ProxyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DaemonUnreachable(_) => ErrorCategory::DaemonUnreachable,
            Self::UpstreamOperationFailed(_) => ErrorCategory::UpstreamOperationFailed,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            Self::PayloadTooLarge(_) => ErrorCategory::PayloadTooLarge,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::DaemonUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamOperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            category: self.category(),
            message: self.to_string(),
            http_status: Some(self.status().as_u16()),
        }
    }

    fn body(&self, pinned: Option<Vec<AddedFile>>) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
            pinned,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.body(None)
    }
}

/// A multi-file add that stopped part way. Files in `pinned` were added
/// before `error` and remain pinned.
#[derive(Debug)]
pub struct AddFailure {
    pub error: ProxyError,
    pub pinned: Vec<AddedFile>,
}

impl From<ProxyError> for AddFailure {
    fn from(error: ProxyError) -> Self {
        Self { error, pinned: Vec::new() }
    }
}

impl IntoResponse for AddFailure {
    fn into_response(self) -> Response {
        let pinned = (!self.pinned.is_empty()).then_some(self.pinned);
        self.error.body(pinned)
    }
}
