//! HTTP API.
//!
//! JSON routes under `/api` over a shared [`QueryService`].

pub mod dto;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Extension, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ZeusError};
use crate::query::QueryService;

use self::handlers::{athena, health, queries, runs};

/// Creates the Axum router.
pub fn create_router(service: Arc<QueryService>, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/queries", get(queries::list).post(queries::create))
        .route(
            "/queries/:id",
            get(queries::get)
                .put(queries::update)
                .delete(queries::delete),
        )
        .route(
            "/queries/:id/runs",
            get(queries::list_runs).post(queries::execute),
        )
        .route("/query-runs/:id", get(runs::get).delete(runs::delete))
        .route("/athena/execute", post(athena::execute))
        .route("/athena/results/:execution_id", get(athena::results))
        .route("/athena/export/:execution_id", get(athena::export));

    let mut app = Router::new()
        .nest("/api", api)
        .layer(Extension(service));

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| {
            let parsed = origin.parse();
            if parsed.is_err() {
                warn!("Invalid CORS origin ignored: {origin}");
            }
            parsed.ok()
        })
        .collect();
    if !origins.is_empty() {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    app
}

/// Serves the API until `shutdown` is cancelled, then drains open requests.
pub async fn start_server(
    service: Arc<QueryService>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = create_router(service, config);
    let addr = config.bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ZeusError::config(format!("Failed to bind {addr}: {e}")))?;
    info!("Zeus API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ZeusError::internal(format!("Server error: {e}")))?;

    info!("Zeus API stopped");
    Ok(())
}
