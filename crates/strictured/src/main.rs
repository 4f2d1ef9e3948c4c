//! strictured - runs a process only when its schedule allows
//!
//! Wires together:
//! - Configuration loading
//! - The HTTP-controlled counting process
//! - The orchestrator control loop
//! - Signal-driven shutdown

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stricture_config::load_config;
use stricture_core::{Orchestrator, evaluate_detailed};
use stricture_http::HttpProcess;
use stricture_util::{MOCK_TIME_ENV_VAR, default_config_path, format_duration, is_mock_time_active};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// strictured - Schedule-driven run/pause service
#[derive(Parser, Debug)]
#[command(name = "strictured")]
#[command(about = "Runs a process only when its schedule allows", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/stricture/config.toml, or STRICTURE_CONFIG)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Counting service endpoint override (or set STRICTURE_ENDPOINT env var)
    #[arg(short, long, env = "STRICTURE_ENDPOINT")]
    endpoint: Option<String>,

    /// Print the current verdict and exit
    #[arg(long)]
    evaluate: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "strictured starting");

    if is_mock_time_active() {
        warn!(
            env_var = MOCK_TIME_ENV_VAR,
            now = %stricture_util::now(),
            "Mock time is active"
        );
    }

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let schedule = Arc::new(config.schedule);

    info!(
        config_path = %args.config.display(),
        timezone = %schedule.timezone(),
        date_overrides = schedule.date_overrides().len(),
        poll_interval = %format_duration(config.service.poll_interval),
        "Configuration loaded"
    );

    if args.evaluate {
        let evaluation = evaluate_detailed(&schedule, stricture_util::now());
        println!(
            "{} ({}) at {}",
            evaluation.verdict, evaluation.reason, evaluation.local
        );
        return Ok(());
    }

    let endpoint = args.endpoint.unwrap_or(config.service.endpoint);
    let process = Arc::new(
        HttpProcess::new(&endpoint)
            .with_context(|| format!("Failed to create client for {}", endpoint))?,
    );

    // Set up signal handlers
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
        }
        shutdown.cancel();
    });

    let orchestrator = Orchestrator::new(schedule, process)
        .with_poll_interval(config.service.poll_interval)
        .with_retry_policy(config.service.retry);

    let state = orchestrator
        .run(cancel)
        .await
        .context("Orchestrator stopped on a fatal error")?;

    info!(launches = state.launches, "Shutdown complete");
    Ok(())
}
