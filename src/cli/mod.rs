mod commands;

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use crate::config::{ClientConfig, Settings};

pub use commands::CommandSurface;

/// A CLI to interact with Bunker, your personal IPFS pinning service.
#[derive(Parser, Debug)]
#[command(name = "bunker", version)]
pub struct Cli {
    /// Pinning service base URL, e.g. http://127.0.0.1:8000/api/v2
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// TOML config file with a [client] table
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload a single file and pin it
    Upload {
        file_path: PathBuf,
    },
    /// Unpin a file by its hash
    Remove {
        hash: String,
    },
    /// List all pinned files
    List,
}

impl Cli {
    /// Defaults, then config file, then environment, then flags.
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = Settings::load(self.config.as_deref())?.client;
        if let Some(url) = &self.api_url {
            config.base_url = url.clone();
        }
        Ok(config)
    }
}
