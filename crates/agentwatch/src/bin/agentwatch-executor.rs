//! agentwatch executor
//!
//! Spawned by the host with the path of a Unix socket to connect back to.
//! Runs the graph pipeline on a single-threaded runtime until the host sends
//! SHUTDOWN, closes the socket, or the process is signalled.

use std::path::PathBuf;
use std::sync::Arc;

use agentwatch::{telemetry, EventProcessor, VerbosityControl};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use watchconf::AgentwatchConfig;

#[derive(Parser, Debug)]
#[command(name = "agentwatch-executor")]
#[command(about = "Graph pipeline executor for agentwatch")]
#[command(version)]
struct Args {
    /// Unix socket the host is listening on
    #[arg(long)]
    socket: PathBuf,

    /// Number of command workers (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Config file (replaces ./agentwatch.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        AgentwatchConfig::load_from(args.config.as_deref()).context("Failed to load config")?;
    if let Some(workers) = args.workers {
        config.executor.workers = workers;
    }

    let log = telemetry::init(&config.telemetry.log_level)?;
    if args.verbose {
        log.raise_verbosity();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run(args.socket, config, log))
}

async fn run(socket: PathBuf, config: AgentwatchConfig, log: telemetry::LogControl) -> Result<()> {
    info!("agentwatch-executor {} starting", env!("CARGO_PKG_VERSION"));

    let stream = tokio::net::UnixStream::connect(&socket)
        .await
        .with_context(|| format!("Failed to connect to host at {}", socket.display()))?;

    let processor = Arc::new(EventProcessor::new(&config, Some(Arc::new(log)))?);

    let signalled = Arc::clone(&processor);
    tokio::spawn(async move {
        shutdown_signal().await;
        signalled.request_shutdown();
    });

    processor.run(stream).await;
    info!("agentwatch-executor shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            tokio::signal::ctrl_c().await.ok();
            info!("Received SIGINT, shutting down...");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
