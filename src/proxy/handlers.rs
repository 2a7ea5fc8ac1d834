use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use crate::core::{AddResponse, MessageResponse, PinsResponse, UnpinRequest};
use crate::uploaders::FILES_FIELD;
use super::daemon::{DaemonClient, DaemonError, DaemonSession};
use super::error::{AddFailure, ProxyError};

#[derive(Debug, Clone)]
pub struct AppState {
    pub daemon: DaemonClient,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Rejects a request whose declared length is already over the limit,
    /// before any of the body is read.
    fn check_declared_length(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        match declared {
            Some(len) if len > self.max_upload_bytes as u64 => Err(ProxyError::PayloadTooLarge(format!(
                "Upload of {} bytes exceeds the {} byte limit.",
                len, self.max_upload_bytes
            ))),
            _ => Ok(()),
        }
    }

    fn session(&self) -> Result<DaemonSession, ProxyError> {
        self.daemon
            .connect()
            .map_err(|e| ProxyError::DaemonUnreachable(format!("Could not reach the IPFS daemon. Error: {}", e)))
    }
}

pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to your personal IPFS Pinning Service!".to_string(),
    })
}

/// Add every part of the `files` field, in order. Stops at the first
/// failure; files added before it stay pinned and are listed in the error.
pub async fn add_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AddResponse>, AddFailure> {
    state.check_declared_length(&headers)?;
    let mut multipart = multipart.map_err(|e| ProxyError::InvalidRequest(e.body_text()))?;
    let session = state.session()?;
    let mut added = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let error = multipart_error("request", e);
                return Err(AddFailure { error, pinned: added });
            }
        };
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let content = match field.bytes().await {
            Ok(content) => content,
            Err(e) => {
                let error = multipart_error(&name, e);
                tracing::warn!(file = %name, "failed to read upload: {}", error);
                return Err(AddFailure { error, pinned: added });
            }
        };

        let bytes = content.len();
        match session.add(&name, content).await {
            Ok(file) => {
                tracing::info!(file = %name, hash = %file.hash, bytes, "pinned");
                added.push(file);
            }
            Err(e) => {
                tracing::warn!(file = %name, already_pinned = added.len(), "add failed: {}", e);
                return Err(AddFailure { error: add_error(&name, e), pinned: added });
            }
        }
    }

    if added.is_empty() {
        return Err(ProxyError::InvalidRequest(format!("No files were provided in the '{}' field.", FILES_FIELD)).into());
    }

    Ok(Json(AddResponse { data: added }))
}

pub async fn unpin(
    State(state): State<AppState>,
    payload: Result<Json<UnpinRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ProxyError> {
    let Json(request) = payload.map_err(|e| ProxyError::InvalidRequest(e.body_text()))?;
    let hash = request.hash.trim();
    if hash.is_empty() {
        return Err(ProxyError::InvalidRequest("A hash is required.".to_string()));
    }

    let session = state.session()?;
    let not_pinned = || ProxyError::NotFound(format!("Hash '{}' was not pinned or could not be unpinned.", hash));

    match session.pin_rm(hash).await {
        Ok(pins) if pins.iter().any(|pin| pin == hash) => {
            tracing::info!(%hash, "unpinned");
            Ok(Json(MessageResponse {
                message: format!("Successfully unpinned hash: {}", hash),
            }))
        }
        Ok(pins) => {
            tracing::debug!(%hash, ?pins, "daemon did not report the hash as removed");
            Err(not_pinned())
        }
        Err(e) if e.is_not_pinned() => Err(not_pinned()),
        Err(e) if e.is_unreachable() => Err(ProxyError::DaemonUnreachable(format!(
            "Failed to unpin hash '{}'. Is the IPFS daemon running? Error: {}",
            hash, e
        ))),
        Err(e) => {
            tracing::warn!(%hash, "unpin failed: {}", e);
            Err(ProxyError::UpstreamOperationFailed(format!("Failed to unpin hash '{}'. Error: {}", hash, e)))
        }
    }
}

pub async fn list_pins(State(state): State<AppState>) -> Result<Json<PinsResponse>, ProxyError> {
    let session = state.session()?;

    match session.pin_ls().await {
        Ok(pinned_files) => {
            tracing::debug!(count = pinned_files.len(), "listed pins");
            Ok(Json(PinsResponse { pinned_files }))
        }
        Err(e) if e.is_unreachable() => Err(ProxyError::DaemonUnreachable(format!(
            "Could not list pinned files. Is the IPFS daemon running? Error: {}",
            e
        ))),
        Err(e) => {
            tracing::warn!("pin listing failed: {}", e);
            Err(ProxyError::UpstreamOperationFailed(format!("Could not list pinned files. Error: {}", e)))
        }
    }
}

fn add_error(name: &str, err: DaemonError) -> ProxyError {
    if err.is_unreachable() {
        ProxyError::DaemonUnreachable(format!(
            "Failed to upload file '{}'. Is the IPFS daemon running? Error: {}",
            name, err
        ))
    } else {
        ProxyError::UpstreamOperationFailed(format!("Failed to upload file '{}'. Error: {}", name, err))
    }
}

fn multipart_error(name: &str, err: MultipartError) -> ProxyError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::PayloadTooLarge(format!("File '{}' exceeds the upload size limit.", name))
    } else {
        ProxyError::InvalidRequest(format!("Malformed upload for '{}': {}", name, err.body_text()))
    }
}
