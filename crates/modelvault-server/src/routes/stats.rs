//! Statistics and health endpoints.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use super::AppState;

/// Creates the stats router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(system_stats))
        .with_state(state)
}

/// Creates the health router.
pub fn health_router(state: AppState) -> Router {
    Router::new().route("/", get(health)).with_state(state)
}

/// GET /api/stats
///
/// Read only; does not add to the access log.
async fn system_stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.coordinator.system_stats().await;
    Json(json!({
        "success": true,
        "stats": stats,
    }))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "healthy",
        "mount_point": state.coordinator.mount_point().display().to_string(),
    }))
}
