//! Zapcast Rendezvous - standalone watch-party server for Zapcast.
//!
//! This binary hosts the party and chat endpoints that Zapcast players
//! synchronize through. All state lives in memory; restarting the process
//! drops every party.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use zapcast_core::api::{start_server, AppState, PartyRegistry};

use crate::config::ServerConfig;

/// Zapcast Rendezvous - watch-party coordination server.
#[derive(Parser, Debug)]
#[command(name = "zapcast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ZAPCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "ZAPCAST_BIND_PORT")]
    port: Option<u16>,

    /// Bind address (overrides config file).
    #[arg(short = 'b', long, env = "ZAPCAST_BIND_ADDR")]
    bind: Option<std::net::IpAddr>,

    /// Refuse cross-origin browser requests.
    #[arg(long)]
    disable_cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Zapcast Rendezvous v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.disable_cors {
        config.permissive_cors = false;
    }

    log::info!(
        "Configuration: bind_addr={}, bind_port={}, permissive_cors={}",
        config.bind_addr,
        config.bind_port,
        config.permissive_cors
    );

    let state = AppState::new(Arc::new(PartyRegistry::new()));
    let options = config.to_server_options();

    // Spawn the HTTP server on the main tokio runtime.
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(state, options).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Parties live in memory only; nothing to flush.
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
