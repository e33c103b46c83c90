//! HTTP API layer of the rendezvous server.
//!
//! This module contains thin handlers that delegate to the party
//! registry. It provides the router construction and server startup
//! functionality.

use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;

pub mod http;
pub mod registry;
pub mod response;

pub use registry::{MessageOutcome, PartyRegistry, PartyView, RosterMember};

/// Default port of the rendezvous server.
pub const DEFAULT_PORT: u16 = 8002;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// All live parties.
    pub registry: Arc<PartyRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<PartyRegistry>) -> Self {
        Self { registry }
    }
}

/// Listening options for [`start_server`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Address to bind.
    pub bind: IpAddr,
    /// Port to bind; `0` scans upward from [`DEFAULT_PORT`].
    pub port: u16,
    /// Answer browser clients from any origin.
    pub permissive_cors: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            permissive_cors: true,
        }
    }
}

async fn find_available_port(
    bind: IpAddr,
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from((bind, port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the rendezvous server on the configured or auto-discovered port.
pub async fn start_server(state: AppState, options: ServerOptions) -> Result<(), ServerError> {
    let (port, listener) = if options.port > 0 {
        let addr = std::net::SocketAddr::from((options.bind, options.port));
        (options.port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(options.bind, DEFAULT_PORT, DEFAULT_PORT + 10).await?
    };

    log::info!(
        "[Server] Rendezvous listening on http://{}:{}",
        options.bind,
        port
    );
    let router = http::create_router(state);
    let app = if options.permissive_cors {
        router.layer(http::cors_layer())
    } else {
        router
    };
    axum::serve(listener, app).await?;
    Ok(())
}
