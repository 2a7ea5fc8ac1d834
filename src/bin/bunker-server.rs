use std::path::PathBuf;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use bunker::config::Settings;

/// Pin registry proxy in front of a local IPFS daemon.
#[derive(Parser, Debug)]
#[command(name = "bunker-server", version)]
struct Args {
    /// TOML config file with a [proxy] table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8000
    #[arg(long)]
    listen: Option<String>,

    /// Daemon RPC endpoint, e.g. http://127.0.0.1:5001
    #[arg(long)]
    daemon_api: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut proxy = Settings::load(args.config.as_deref())?.proxy;
    if let Some(listen) = args.listen {
        proxy.listen_addr = listen;
    }
    if let Some(api) = args.daemon_api {
        proxy.daemon_api_url = api;
    }

    bunker::proxy::serve(proxy).await
}
