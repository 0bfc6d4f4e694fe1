//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - Upload and download routes over the transfer service
//! - Health check
//! - JSON error responses

pub mod error;
pub mod routes;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use stowage_core::transfer::TransferService;
use stowage_shared::GatewayConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Upload/download orchestrator.
    pub transfer: TransferService,
    /// Largest request body accepted on upload.
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build state from a transfer service and its gateway configuration.
    #[must_use]
    pub fn new(transfer: TransferService, config: &GatewayConfig) -> Self {
        Self {
            transfer,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
