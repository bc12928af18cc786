//! HTTP tests for the `/api` routes.
//!
//! Requests go through the full router with `oneshot`; the hub is replaced by
//! a scripted fetcher.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{open_coordinator, ScriptedFetcher, FETCH_TIMEOUT};
use modelvault_server::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    router: Router,
    fetcher: Arc<ScriptedFetcher>,
}

impl TestApp {
    async fn new(fetcher: impl FnOnce(&std::path::Path) -> ScriptedFetcher) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let fetcher = Arc::new(fetcher(dir.path()));
        let coordinator = open_coordinator(dir.path(), fetcher.clone(), FETCH_TIMEOUT).await;
        Self {
            _dir: dir,
            router: create_router(AppState::new(coordinator)),
            fetcher,
        }
    }

    async fn succeeding() -> Self {
        Self::new(|root| ScriptedFetcher::succeeding(root, 4096)).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        (status, json_body(response).await)
    }

    async fn download(&self, body: Value, forwarded_for: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/models/download")
                .header("Content-Type", "application/json")
                .header("X-Forwarded-For", forwarded_for)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

/// Helper to parse JSON response body.
async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&body).expect("Failed to parse JSON response")
}

#[tokio::test]
async fn test_health_reports_mount_point() {
    let app = TestApp::succeeding().await;

    let (status, body) = app.get("/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "healthy");
    assert!(body["mount_point"].as_str().is_some());
}

#[tokio::test]
async fn test_download_then_repeat() {
    let app = TestApp::succeeding().await;

    let (status, body) = app
        .download(json!({"model_name": "org/model", "username": "alice"}), "10.0.0.1, 172.16.0.1")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["already_exists"], false);
    assert_eq!(body["message"], "Model downloaded successfully");
    assert_eq!(body["model"]["id"], "org_model");
    assert_eq!(body["model"]["name"], "org/model");
    assert_eq!(body["model"]["status"], "ready");
    assert_eq!(body["model"]["size_bytes"], 4096);
    assert_eq!(body["model"]["stats"]["first_downloaded_by"], "alice");
    assert_eq!(body["model"]["stats"]["first_downloaded_from"], "10.0.0.1");

    let (status, body) = app
        .download(json!({"model_name": "org/model", "username": "bob"}), "10.0.0.2")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_exists"], true);
    assert_eq!(body["message"], "Model already exists");
    assert_eq!(body["model"]["downloaded_by"], "bob");
    assert_eq!(body["model"]["stats"]["download_count"], 2);
    assert_eq!(body["model"]["stats"]["first_downloaded_by"], "alice");
    assert_eq!(app.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_download_requires_model_name() {
    let app = TestApp::succeeding().await;

    let (status, body) = app.download(json!({"username": "alice"}), "10.0.0.1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "model_name is required");

    let (status, _) = app.download(json!({"model_name": "   "}), "10.0.0.1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = app.get("/api/stats").await;
    assert_eq!(stats["stats"]["total_requests"], 0);
    assert_eq!(app.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_unknown_model_is_not_found() {
    let app = TestApp::succeeding().await;

    let (status, body) = app.get("/api/models/missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "error": "Model not found"}));
}

#[tokio::test]
async fn test_list_and_get_use_header_username() {
    let app = TestApp::succeeding().await;
    app.download(json!({"model_name": "gpt2", "username": "alice"}), "10.0.0.1")
        .await;

    let (status, body) = app
        .send(
            Request::builder()
                .uri("/api/models")
                .header("X-Username", "carol")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], "gpt2");

    let (status, body) = app.get("/api/models/gpt2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"]["stats"]["access_count"], 1);

    let (_, stats) = app.get("/api/stats").await;
    let recent = stats["stats"]["recent_activity"].as_array().unwrap();
    assert_eq!(recent[0]["action"], "get");
    assert_eq!(recent[0]["username"], "anonymous");
    assert_eq!(recent[1]["action"], "list");
    assert_eq!(recent[1]["username"], "carol");
    assert_eq!(stats["stats"]["unique_users"], 3);
}

#[tokio::test]
async fn test_update_and_delete() {
    let app = TestApp::succeeding().await;
    app.download(json!({"model_name": "gpt2", "username": "alice"}), "10.0.0.1")
        .await;

    let (status, body) = app
        .send(
            Request::builder()
                .method("PUT")
                .uri("/api/models/gpt2")
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"status": "error", "username": "bob"}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Model updated successfully");
    assert_eq!(body["model"]["status"], "error");

    let (status, _) = app
        .send(
            Request::builder()
                .method("PUT")
                .uri("/api/models/gpt2")
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"status": "downloading"}).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/models/gpt2")
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = app.send(delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Model deleted successfully");
    assert_eq!(app.fetcher.removed().len(), 1);

    let (status, _) = app.send(delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, stats) = app.get("/api/stats").await;
    assert_eq!(stats["stats"]["total_models"], 0);
    // download, update, delete, delete
    assert_eq!(stats["stats"]["total_requests"], 4);
}

#[tokio::test]
async fn test_hub_failure_is_bad_gateway() {
    let app = TestApp::new(ScriptedFetcher::failing).await;

    let (status, body) = app
        .download(json!({"model_name": "org/missing"}), "10.0.0.1")
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);

    let (status, body) = app.get("/api/models/org_missing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"]["status"], "error");
    assert_eq!(body["model"]["stats"]["download_count"], 0);
}

#[tokio::test]
async fn test_id_collision_is_conflict() {
    let app = TestApp::succeeding().await;
    app.download(json!({"model_name": "a/b"}), "10.0.0.1").await;

    let (status, body) = app.download(json!({"model_name": "a_b"}), "10.0.0.1").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}
