//! stricture-demo-api - counting service for trying out strictured
//!
//! Each launch starts a counter that advances once per second while not
//! paused. Point strictured's endpoint at this service to watch the
//! schedule pause and resume it.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use stricture_http::server::{self, CounterSettings, DEFAULT_COUNT_LIMIT};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Counting service controlled by strictured
#[derive(Parser, Debug)]
#[command(name = "stricture-demo-api")]
#[command(about = "Counting service controlled by strictured", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Milliseconds per counter tick
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Ticks after which a counter finishes
    #[arg(long, default_value_t = DEFAULT_COUNT_LIMIT)]
    limit: u64,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let settings = CounterSettings {
        tick: Duration::from_millis(args.tick_ms.max(1)),
        limit: args.limit,
    };

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;

    let cancel = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
        shutdown.cancel();
    });

    server::serve(listener, settings, cancel)
        .await
        .context("Counting service failed")?;

    info!("Shutdown complete");
    Ok(())
}
