#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tilefarm_api::config::ServerConfig;
use tilefarm_core::aggregation::DEFAULT_PREVIEW_MAX_PIXELS;
use tilefarm_api::router::build_app_router;
use tilefarm_api::state::AppState;
use tilefarm_db::{JobStore, MemoryJobStore};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// 100px tiles and a 2x2 mosaic grid.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        tile_size: 100,
        job_insert_batch_size: 1000,
        strict_claim: false,
        stale_job_timeout_secs: None,
        lease_timeout_secs: 20,
        grid_tiles_x: 2,
        grid_tiles_y: 2,
        preview_max_pixels: DEFAULT_PREVIEW_MAX_PIXELS,
    }
}

/// Build the full application router over a fresh in-memory store.
///
/// Goes through [`build_app_router`] so integration tests exercise the
/// same middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery) that production uses.
pub fn build_test_app() -> Router {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> Router {
    build_test_app_on(Arc::new(MemoryJobStore::new()), config)
}

pub fn build_test_app_on(store: Arc<dyn JobStore>, config: ServerConfig) -> Router {
    let state = AppState::new(store, config.clone());
    build_app_router(state, &config)
}

/// A valid task creation body for a `width x height` image.
pub fn task_body(width: i64, height: i64) -> Value {
    serde_json::json!({
        "scene_mesh_url": "https://bucket.s3.amazonaws.com/uploads/room.glb",
        "scene_textures_url": "https://bucket.s3.amazonaws.com/uploads/room.png",
        "cam_position_x": 0.0,
        "cam_position_y": 1.5,
        "cam_position_z": 6.0,
        "cam_target_x": 0.0,
        "cam_target_y": 0.0,
        "cam_target_z": 0.0,
        "width": width,
        "height": height,
    })
}

pub async fn send(app: Router, method: Method, uri: &str, body: Option<&Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(&body)).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Create a task through the API and return its id.
pub async fn create_task(app: &Router, width: i64, height: i64) -> i64 {
    let response = post_json(app.clone(), "/api/v1/tasks", task_body(width, height)).await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"]["task_id"].as_i64().unwrap()
}
