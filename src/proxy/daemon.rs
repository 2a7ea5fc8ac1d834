//! Storage daemon RPC.
//!
//! Every proxy request opens its own [`DaemonSession`]; the session owns a
//! non-pooling HTTP client, so dropping it closes the daemon connection on
//! every exit path.

use std::collections::BTreeMap;
use std::time::Duration;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;
use crate::core::{AddedFile, PinRecord};

/// Pin type reported when the daemon omits one.
pub const UNKNOWN_PIN_TYPE: &str = "N/A";

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("daemon unreachable: {0}")]
    Unreachable(String),

    #[error("daemon error (HTTP {status_code}): {message}")]
    Rpc {
        status_code: u16,
        message: String,
    },

    #[error("unexpected daemon response: {0}")]
    InvalidResponse(String),

    #[error("invalid daemon address: {0}")]
    InvalidAddress(String),
}

impl DaemonError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        // connect, timeout and dropped connections all mean nobody answered
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }

    /// The daemon refuses to unpin something it does not hold.
    pub fn is_not_pinned(&self) -> bool {
        matches!(self, Self::Rpc { message, .. } if message.contains("not pinned"))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    api_url: Url,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, DaemonError> {
        let mut api_url = Url::parse(api_url).map_err(|e| DaemonError::InvalidAddress(format!("{}: {}", api_url, e)))?;
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Ok(Self { api_url, timeout })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Open a fresh session. Nothing is shared with other sessions.
    pub fn connect(&self) -> Result<DaemonSession, DaemonError> {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|e| DaemonError::Unreachable(e.to_string()))?;

        Ok(DaemonSession {
            client,
            api_url: self.api_url.clone(),
        })
    }
}

pub struct DaemonSession {
    client: Client,
    api_url: Url,
}

impl DaemonSession {
    fn rpc_url(&self, command: &str) -> Result<Url, DaemonError> {
        self.api_url
            .join(&format!("api/v0/{}", command))
            .map_err(|e| DaemonError::InvalidAddress(e.to_string()))
    }

    /// Add `content` and pin it.
    pub async fn add(&self, name: &str, content: Bytes) -> Result<AddedFile, DaemonError> {
        let part = Part::stream_with_length(content.clone(), content.len() as u64)
            .file_name(name.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.rpc_url("add")?)
            .query(&[("pin", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(DaemonError::from_reqwest)?;

        let reply: AddReply = decode(response).await?;
        Ok(AddedFile {
            name: name.to_string(),
            hash: reply.hash,
            size: reply.size.unwrap_or_else(|| content.len().to_string()),
        })
    }

    /// Remove the pin on `hash`, returning the hashes the daemon unpinned.
    pub async fn pin_rm(&self, hash: &str) -> Result<Vec<String>, DaemonError> {
        let response = self
            .client
            .post(self.rpc_url("pin/rm")?)
            .query(&[("arg", hash)])
            .send()
            .await
            .map_err(DaemonError::from_reqwest)?;

        let reply: PinRmReply = decode(response).await?;
        Ok(reply.pins)
    }

    /// Pin set flattened into records, ordered by hash.
    pub async fn pin_ls(&self) -> Result<Vec<PinRecord>, DaemonError> {
        let response = self
            .client
            .post(self.rpc_url("pin/ls")?)
            .send()
            .await
            .map_err(DaemonError::from_reqwest)?;

        let reply: PinLsReply = decode(response).await?;
        Ok(reply
            .keys
            .into_iter()
            .map(|(hash, details)| PinRecord {
                hash,
                pin_type: details
                    .and_then(|d| d.pin_type)
                    .unwrap_or_else(|| UNKNOWN_PIN_TYPE.to_string()),
                size: None,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct AddReply {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default, deserialize_with = "string_or_number")]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PinRmReply {
    #[serde(rename = "Pins", default)]
    pins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PinLsReply {
    #[serde(rename = "Keys", default)]
    keys: BTreeMap<String, Option<PinDetails>>,
}

#[derive(Debug, Deserialize)]
struct PinDetails {
    #[serde(rename = "Type", default)]
    pin_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    #[serde(rename = "Message")]
    message: String,
}

// Sizes arrive as strings from the add RPC, numbers from some versions.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DaemonError> {
    let status = response.status();
    let body = response.text().await.map_err(DaemonError::from_reqwest)?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorReply>(&body)
            .map(|reply| reply.message)
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(DaemonError::Rpc {
            status_code: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| DaemonError::InvalidResponse(format!("{}: {}", e, body.trim())))
}
