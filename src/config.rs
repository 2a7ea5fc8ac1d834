//! Client and proxy settings.
//!
//! Values come from built-in defaults, then an optional TOML file with
//! `[client]` and `[proxy]` tables, then environment overrides. Durations
//! are written as whole seconds.

use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v2";
pub const DEFAULT_GATEWAY_DOMAIN: &str = "ipfs.dweb.link";
pub const DEFAULT_DAEMON_API: &str = "http://127.0.0.1:5001";

pub const ENV_API_URL: &str = "BUNKER_API_URL";
pub const ENV_GATEWAY_DOMAIN: &str = "BUNKER_GATEWAY_DOMAIN";
pub const ENV_DAEMON_API: &str = "BUNKER_DAEMON_API";
pub const ENV_LISTEN_ADDR: &str = "BUNKER_LISTEN_ADDR";

mod secs {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Settings for the command surface and upload transport.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Proxy base URL including the versioned prefix
    pub base_url: String,
    /// Retrieval URLs are `https://<hash>.<gateway_domain>`
    pub gateway_domain: String,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Bounds the whole exchange: transfer plus server processing
    #[serde(with = "secs")]
    pub read_timeout: Duration,
    /// Abort when no file bytes were read for this long
    #[serde(with = "secs")]
    pub stall_timeout: Duration,
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            gateway_domain: DEFAULT_GATEWAY_DOMAIN.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
            stall_timeout: Duration::from_secs(30),
            chunk_size: 64 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn retrieval_url(&self, hash: &str) -> String {
        format!("https://{}.{}", hash, self.gateway_domain.trim_matches('.'))
    }
}

/// Settings for the pin registry proxy.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen_addr: String,
    /// Storage daemon RPC endpoint
    pub daemon_api_url: String,
    /// Upper bound on any single daemon RPC
    #[serde(with = "secs")]
    pub daemon_timeout: Duration,
    pub max_upload_bytes: usize,
    pub api_prefix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            daemon_api_url: DEFAULT_DAEMON_API.to_string(),
            daemon_timeout: Duration::from_secs(60),
            max_upload_bytes: 1024 * 1024 * 1024,
            api_prefix: "/api/v2".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub proxy: ProxyConfig,
}

impl Settings {
    pub fn from_toml(source: &str) -> anyhow::Result<Settings> {
        toml::from_str(source).context("Can't parse bunker config")
    }

    /// Load `path` if given, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
        let mut settings = match path {
            Some(path) => {
                let source = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_toml(&source)?
            }
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.client.base_url = url;
        }
        if let Some(domain) = lookup(ENV_GATEWAY_DOMAIN) {
            self.client.gateway_domain = domain;
        }
        if let Some(api) = lookup(ENV_DAEMON_API) {
            self.proxy.daemon_api_url = api;
        }
        if let Some(addr) = lookup(ENV_LISTEN_ADDR) {
            self.proxy.listen_addr = addr;
        }
    }
}
