//! HTTP-level integration tests for the job claim protocol.

mod common;

use axum::http::StatusCode;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use common::{body_json, build_test_app, build_test_app_with, create_task, get, post_json, test_config};
use serde_json::{json, Value};

async fn next_job(app: &axum::Router, task_id: i64) -> Option<Value> {
    let response = get(app.clone(), &format!("/api/v1/tasks/{task_id}/jobs/next")).await;
    match response.status() {
        StatusCode::OK => Some(body_json(response).await["data"].clone()),
        StatusCode::NO_CONTENT => None,
        other => panic!("unexpected status {other}"),
    }
}

// ---------------------------------------------------------------------------
// Next / start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn next_job_carries_task_parameters() {
    let app = build_test_app();
    let task_id = create_task(&app, 250, 250).await;

    let next = next_job(&app, task_id).await.unwrap();

    assert_eq!(next["job"]["x"], 0);
    assert_eq!(next["job"]["y"], 0);
    assert_eq!(next["job"]["status_id"], 1);
    assert_eq!(next["task"]["width"], 250);
    assert_eq!(next["task"]["scene_mesh_url"], "https://bucket.s3.amazonaws.com/uploads/room.glb");
}

#[tokio::test]
async fn next_job_is_read_only_until_started() {
    let app = build_test_app();
    let task_id = create_task(&app, 200, 100).await;

    let a = next_job(&app, task_id).await.unwrap();
    let b = next_job(&app, task_id).await.unwrap();
    assert_eq!(a["job"]["id"], b["job"]["id"]);

    let job_id = a["job"]["id"].as_i64().unwrap();
    let response = post_json(app.clone(), &format!("/api/v1/jobs/{job_id}/start"), json!({ "worker_id": "gpu-1" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let started = body_json(response).await;
    assert_eq!(started["data"]["status_id"], 2);
    assert_eq!(started["data"]["assigned_worker_id"], "gpu-1");

    let c = next_job(&app, task_id).await.unwrap();
    assert_eq!(c["job"]["x"], 100);
}

#[tokio::test]
async fn exhausted_task_returns_no_content() {
    let app = build_test_app();
    let task_id = create_task(&app, 100, 100).await;
    let job_id = next_job(&app, task_id).await.unwrap()["job"]["id"].as_i64().unwrap();

    post_json(app.clone(), &format!("/api/v1/jobs/{job_id}/start"), json!({})).await;

    assert!(next_job(&app, task_id).await.is_none());
}

#[tokio::test]
async fn start_defaults_worker_and_overwrites() {
    let app = build_test_app();
    let task_id = create_task(&app, 100, 100).await;
    let job_id = next_job(&app, task_id).await.unwrap()["job"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/jobs/{job_id}/start");

    let first = body_json(post_json(app.clone(), &uri, json!({})).await).await;
    assert_eq!(first["data"]["assigned_worker_id"], "unknown-worker");

    post_json(
        app.clone(),
        &format!("/api/v1/jobs/{job_id}/complete"),
        json!({ "result_data": BASE64_STANDARD.encode([1u8; 4]) }),
    )
    .await;

    let response = post_json(app, &uri, json!({ "worker_id": "late" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let again = body_json(response).await;
    assert_eq!(again["data"]["status_id"], 2);
    assert_eq!(again["data"]["assigned_worker_id"], "late");
}

#[tokio::test]
async fn strict_claim_rejects_second_start() {
    let mut config = test_config();
    config.strict_claim = true;
    let app = build_test_app_with(config);
    let task_id = create_task(&app, 100, 100).await;
    let job_id = next_job(&app, task_id).await.unwrap()["job"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/jobs/{job_id}/start");

    let first = post_json(app.clone(), &uri, json!({ "worker_id": "a" })).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_json(app, &uri, json!({ "worker_id": "b" })).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "CONFLICT");
}

#[tokio::test]
async fn claim_endpoint_hands_out_each_job_once() {
    let app = build_test_app();
    let task_id = create_task(&app, 200, 100).await;
    let uri = format!("/api/v1/tasks/{task_id}/jobs/claim");

    let a = body_json(post_json(app.clone(), &uri, json!({ "worker_id": "a" })).await).await;
    let b = body_json(post_json(app.clone(), &uri, json!({ "worker_id": "b" })).await).await;
    assert_ne!(a["data"]["job"]["id"], b["data"]["job"]["id"]);
    assert_eq!(b["data"]["job"]["assigned_worker_id"], "b");

    let none = post_json(app, &uri, json!({ "worker_id": "c" })).await;
    assert_eq!(none.status(), StatusCode::NO_CONTENT);
}

// ---------------------------------------------------------------------------
// Complete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_twice_keeps_second_payload() {
    let app = build_test_app();
    let task_id = create_task(&app, 100, 100).await;
    let job_id = next_job(&app, task_id).await.unwrap()["job"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/jobs/{job_id}/complete");

    post_json(app.clone(), &uri, json!({ "result_data": "AQID" })).await;
    let response = post_json(app.clone(), &uri, json!({ "result_data": "AAEC/w==" })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let job = body_json(get(app, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(job["data"]["status_id"], 3);
    assert_eq!(job["data"]["result_data"], "AAEC/w==");
}

#[tokio::test]
async fn complete_validates_payload() {
    let app = build_test_app();
    let task_id = create_task(&app, 100, 100).await;
    let job_id = next_job(&app, task_id).await.unwrap()["job"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/jobs/{job_id}/complete");

    let missing = post_json(app.clone(), &uri, json!({})).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let garbage = post_json(app, &uri, json!({ "result_data": "%%%" })).await;
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(garbage).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = build_test_app();

    let start = post_json(app.clone(), "/api/v1/jobs/404/start", json!({})).await;
    assert_eq!(start.status(), StatusCode::NOT_FOUND);

    let complete = post_json(app.clone(), "/api/v1/jobs/404/complete", json!({ "result_data": "AA==" })).await;
    assert_eq!(complete.status(), StatusCode::NOT_FOUND);

    assert_eq!(get(app, "/api/v1/jobs/404").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_size_large_tile_result_accepted() {
    let config = tilefarm_api::config::ServerConfig {
        tile_size: 1024,
        ..test_config()
    };
    let app = build_test_app_with(config);
    let task_id = create_task(&app, 1024, 1024).await;
    let job = next_job(&app, task_id).await.unwrap();
    let job_id = job["job"]["id"].as_i64().unwrap();

    // 4 MiB of pixels, about 5.3 MiB once base64 encoded.
    let pixels = BASE64_STANDARD.encode(vec![42u8; 1024 * 1024 * 4]);
    let response = post_json(
        app,
        &format!("/api/v1/jobs/{job_id}/complete"),
        json!({ "result_data": pixels }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}
