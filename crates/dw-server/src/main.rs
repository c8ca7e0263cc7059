//! doorway daemon
//!
//! Binds the telnet listener, runs the idle sweep and the statistics
//! sink, and tears everything down gracefully on Ctrl-C/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dw_core::config::{self, ServerConfig};
use dw_core::directory::{MemoryDirectory, UserDirectory};
use dw_core::events::EventBus;
use dw_server::server::TelnetServer;
use dw_server::session::registry::shutdown_all;
use dw_server::session::sweep::run_idle_sweep;
use dw_server::state::ServerState;
use dw_server::stats::run_stats_sink;

#[derive(Parser)]
#[command(name = "dw-server")]
#[command(about = "doorway - multi-node telnet BBS host with door support")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("doorway starting...");

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::info!("Using default configuration");
        ServerConfig::default()
    };

    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    if config.doors.is_empty() {
        tracing::warn!("No doors configured - callers will only see the log-off option");
    } else {
        tracing::info!("{} doors configured", config.doors.len());
    }

    // Wire up the collaborators: an in-memory user directory and the
    // statistics sink consuming the event channel
    let directory: Arc<dyn UserDirectory> = Arc::new(MemoryDirectory::new());
    let (events, events_rx) = EventBus::new(256);

    let state = Arc::new(ServerState::new(config, directory, events));

    // Two-stage shutdown: the signal fires `shutdown`, which triggers the
    // notice-and-grace sequence; `cancel` is the hard stop that follows it
    // and reaches the listener, the sweep, and every session token.
    let shutdown = CancellationToken::new();
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = shutdown.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    // Statistics sink
    let stats_cancel = cancel.clone();
    let stats_task = tokio::spawn(run_stats_sink(events_rx, stats_cancel));

    // Idle sweep
    tokio::spawn(run_idle_sweep(
        Arc::clone(&state.sessions),
        state.config.idle_timeout,
        state.config.sweep_interval,
        cancel.clone(),
    ));

    // Accept callers until the shutdown signal
    let server = TelnetServer::bind(&bind_addr, Arc::clone(&state), cancel.clone()).await?;
    tokio::select! {
        result = server.run() => result?,
        _ = shutdown.cancelled() => {}
    }

    // Graceful shutdown: notice, grace period, then force-close
    shutdown_all(&state.sessions, state.config.shutdown_grace).await;
    cancel.cancel();

    let _ = stats_task.await;
    tracing::info!("doorway shutdown complete");
    Ok(())
}
