//! Model catalog endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::requester::ClientInfo;
use super::AppState;
use crate::coordinator::ModelUpdate;
use crate::error::AppError;
use crate::models::ModelStatus;

/// Request body for `POST /api/models/download`.
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub model_name: Option<String>,
    pub username: Option<String>,
}

/// Request body for `PUT /api/models/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    pub status: Option<ModelStatus>,
    pub username: Option<String>,
}

/// Creates the models router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_models))
        .route("/download", post(download_model))
        .route(
            "/{id}",
            get(get_model).put(update_model).delete(delete_model),
        )
        .with_state(state)
}

/// GET /api/models
async fn list_models(
    State(state): State<AppState>,
    client: ClientInfo,
) -> Result<Json<Value>, AppError> {
    let models = state.coordinator.list(&client.requester(None)).await?;
    Ok(Json(json!({
        "success": true,
        "models": models,
    })))
}

/// GET /api/models/{id}
async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    client: ClientInfo,
) -> Result<Json<Value>, AppError> {
    let model = state.coordinator.get(&id, &client.requester(None)).await?;
    Ok(Json(json!({
        "success": true,
        "model": model,
    })))
}

/// POST /api/models/download
///
/// Fetches the model from the hub unless it is already present. Blocks until
/// the fetch settles.
async fn download_model(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<Value>, AppError> {
    let model_name = req
        .model_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("model_name is required".to_string()))?;
    let requester = client.requester(req.username.as_deref());

    let outcome = state.coordinator.download(&model_name, &requester).await?;
    let message = if outcome.already_exists {
        "Model already exists"
    } else {
        "Model downloaded successfully"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "model": outcome.model,
        "already_exists": outcome.already_exists,
    })))
}

/// PUT /api/models/{id}
async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    client: ClientInfo,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let requester = client.requester(req.username.as_deref());
    let changes = ModelUpdate { status: req.status };

    let model = state.coordinator.update(&id, changes, &requester).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Model updated successfully",
        "model": model,
    })))
}

/// DELETE /api/models/{id}
async fn delete_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    client: ClientInfo,
) -> Result<Json<Value>, AppError> {
    state.coordinator.delete(&id, &client.requester(None)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Model deleted successfully",
    })))
}
