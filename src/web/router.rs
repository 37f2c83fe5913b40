//! Web application router and middleware setup.

use crate::error::Result;
use crate::web::config::WebConfig;
use crate::web::{handlers, websocket, AppState};
use axum::{routing::get, Router};
use std::path::PathBuf;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

/// Create the axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: AppState) -> Result<Router> {
    let mut app = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/ws", get(websocket::websocket_handler));

    // Serve a custom dashboard when one is configured, the embedded one
    // otherwise.
    if let Some(static_path) = &config.static_path {
        let static_path = PathBuf::from(static_path);
        if static_path.exists() {
            info!("Serving static files from: {:?}", static_path);
            app = app.nest_service("/static", ServeDir::new(&static_path));

            let index_file = static_path.join("index.html");
            if index_file.exists() {
                let index = index_file.to_string_lossy().to_string();
                app = app.route("/", get(move || handlers::serve_index(index.clone())));
            } else {
                app = app.route("/", get(handlers::default_index));
            }
        } else {
            tracing::warn!(
                "Static path {:?} does not exist, serving built-in dashboard",
                static_path
            );
            app = app.route("/", get(handlers::default_index));
        }
    } else {
        app = app.route("/", get(handlers::default_index));
    }

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app = app.layer(TraceLayer::new_for_http());

    Ok(app.with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SharedState;
    use crate::web::websocket::Broadcaster;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_app() {
        let state = AppState {
            broadcaster: Broadcaster::new(8),
            station: Arc::new(SharedState::default()),
        };
        let app = create_app(&WebConfig::default(), state);
        assert!(app.is_ok());
    }
}
