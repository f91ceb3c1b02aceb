//! Live retro server - real-time collaborative retrospective boards.

use anyhow::Result;
use clap::Parser;
use retro_server::{config::Config, logging, routes, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use logging::{LogConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "retro-server")]
#[command(about = "HTTP/WebSocket server for collaborative retrospective boards")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes ping traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "hub=debug" or "ws::ping=trace").
    /// Can be specified multiple times. Targets are prefixed with "retro::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        target: "retro::startup",
        "Loaded configuration (port: {}, store: {:?}, board ttl: {}s)",
        config.port,
        config.store.backend,
        config.board_ttl_secs
    );

    let state = Arc::new(AppState::new(config.clone())?);
    let _sweeper = state.start_sweeper();
    tracing::info!(
        target: "retro::startup",
        "Started expiry sweeper (every {}s)",
        config.sweep_interval_secs
    );

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "retro::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
