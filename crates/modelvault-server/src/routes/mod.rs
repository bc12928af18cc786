//! API routes for the modelvault server.

pub mod models;
pub mod requester;
pub mod stats;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .nest("/models", models::router(state.clone()))
        .nest("/stats", stats::router(state.clone()))
        .nest("/health", stats::health_router(state))
}
