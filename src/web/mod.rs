//! Web server and subscriber-facing surface.
//!
//! Serves the live dashboard, a health endpoint, and the WebSocket stream
//! that merged weather state is pushed over.

pub mod config;
pub mod handlers;
pub mod router;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;
pub use websocket::Broadcaster;

use crate::error::{Result, StationError};
use crate::link::SharedState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// State shared with every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out channel the supervisor publishes into
    pub broadcaster: Broadcaster,
    /// Read-only view of the pipeline state, for health reporting
    pub station: Arc<SharedState>,
}

/// Start the web server with the provided configuration and app state.
pub async fn start_web_server(config: WebConfig, state: AppState) -> Result<()> {
    let app = create_app(&config, state)?;

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| StationError::config_error(format!("Invalid bind address: {e}")))?;

    info!("Starting windrose web server on http://{}", addr);
    info!("Dashboard available at http://{}/", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| StationError::web_server_error(format!("Failed to bind to address: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| StationError::web_server_error(format!("Server error: {e}")))?;

    Ok(())
}
