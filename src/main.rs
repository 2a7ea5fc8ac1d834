use std::io;
use std::process::ExitCode;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use bunker::cli::{Cli, CommandSurface};
use bunker::PinClient;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // warn by default so log lines do not tear through the progress bar
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = match cli.client_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = match PinClient::new(config.clone()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e.report());
            return ExitCode::FAILURE;
        }
    };

    let mut surface = CommandSurface::new(client, config, io::stdout(), io::stderr());
    if surface.run(&cli.command).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
