//! Sequoia Server - local control API.
//!
//! Exposes the state owned by the bridge actor (pause flag, daily limit,
//! savings, goals, compression log) to the popup and dashboard.
//!
//! ## Endpoints
//!
//! - `GET /api/status` - Settings snapshot and service health
//! - `GET /api/stats` - Bridge counters
//! - `GET /api/health` - Probe the compression service
//! - `GET /api/savings` - Environmental savings and goal progress
//! - `POST /api/savings/reset` - Reset savings
//! - `GET|PUT /api/daily-limit` - Read or set the daily limit
//! - `POST /api/pause`, `POST /api/resume` - Toggle compression
//! - `GET|PUT /api/goals` - Weekly goals
//! - `POST /api/welcome/complete` - Finish onboarding
//! - `GET /api/compressions` - Recent compression log
//!
//! ## Example
//!
//! ```no_run
//! use sequoia_bridge::BridgeConfig;
//! use sequoia_server::{Server, ServerConfig};
//! use sequoia_storage::Database;
//!
//! #[tokio::main]
//! async fn main() {
//!     let db = Database::new().unwrap();
//!     let (client, _handle) = sequoia_bridge::spawn(db, BridgeConfig::default()).unwrap();
//!     let server = Server::new(ServerConfig::default(), client).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use sequoia_bridge::BridgeClient;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 48766;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Timeout for bridge calls that take one explicitly.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48766).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/health", get(handlers::check_health))
        .route("/api/savings", get(handlers::get_savings))
        .route("/api/savings/reset", post(handlers::reset_savings))
        .route(
            "/api/daily-limit",
            get(handlers::get_daily_limit).put(handlers::set_daily_limit),
        )
        .route("/api/pause", post(handlers::pause))
        .route("/api/resume", post(handlers::resume))
        .route(
            "/api/goals",
            get(handlers::get_goals).put(handlers::set_goals),
        )
        .route("/api/welcome/complete", post(handlers::complete_welcome))
        .route("/api/compressions", get(handlers::get_compressions))
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server talking to the given bridge.
    pub fn new(
        config: ServerConfig,
        bridge: BridgeClient,
    ) -> std::result::Result<Self, ServerError> {
        Self::with_state(config, AppState::new(bridge))
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until the process exits.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Runs the server until `signal` completes, then drains connections.
    pub async fn run_with_shutdown<F>(self, signal: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting Sequoia API server on {}", self.addr);

        let listener = bind(self.addr)?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("API server stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Binds with SO_REUSEADDR so a restart is not blocked by lingering sockets.
fn bind(addr: SocketAddr) -> std::result::Result<tokio::net::TcpListener, ServerError> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::BindError(addr, e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .listen(128)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::BindError(addr, e))?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener).map_err(|e| ServerError::BindError(addr, e))
}
