mod server;

use clap::Parser;
use nupi_adapter_agent::{IntentService, TaskRouter};
use nupi_adapter_core::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nupi-adapter")]
#[command(about = "AI adapter resolving voice intents for Nupi", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "NUPI_ADAPTER_LISTEN_ADDR", default_value = "127.0.0.1:50051")]
    listen: String,

    /// Read the JSON config from this file instead of NUPI_ADAPTER_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(cli.log_json.then(|| fmt::layer().json()))
        .with((!cli.log_json).then(|| fmt::layer()))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    info!(
        count = config.tasks.len(),
        tasks = %config.task_keys().join(", "),
        language = %config.language,
        "Configuration loaded"
    );

    let router = Arc::new(TaskRouter::new(Arc::new(config)));
    let service = IntentService::new(router);

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!(addr = %listener.local_addr()?, "AI adapter listening");

    server::serve(listener, service).await?;
    info!("AI adapter stopped");
    Ok(())
}
