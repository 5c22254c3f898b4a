//! HTTP client for the job endpoints of the Tilefarm API.
//!
//! Wraps the claim protocol (next, start, complete) using [`reqwest`].
//! The worker keeps its own wire types so it does not link the server's
//! persistence layer.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tilefarm_core::tiling::TileRect;

/// A job as the API reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct JobInfo {
    pub id: i64,
    pub task_id: i64,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub status_id: i16,
    pub assigned_worker_id: Option<String>,
}

impl JobInfo {
    pub fn rect(&self) -> TileRect {
        TileRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Scene and camera parameters of the job's task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    pub id: i64,
    pub scene_mesh_url: String,
    pub scene_bvh_url: String,
    pub scene_textures_url: String,
    pub cam_position_x: f64,
    pub cam_position_y: f64,
    pub cam_position_z: f64,
    pub cam_target_x: f64,
    pub cam_target_y: f64,
    pub cam_target_z: f64,
    pub fov: f64,
    pub width: i32,
    pub height: i32,
    pub max_bounces: i32,
    pub samples_per_pixel: i32,
}

/// Body of `GET /tasks/{id}/jobs/next`.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchedJob {
    pub job: JobInfo,
    pub task: TaskInfo,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

impl ClientError {
    /// Whether the server answered with `status`.
    pub fn is_status(&self, status: StatusCode) -> bool {
        matches!(self, ClientError::Api { status: s, .. } if *s == status.as_u16())
    }
}

/// HTTP client for one API server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:3000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: api_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    /// Ask for the next job of a task. `None` when nothing is claimable.
    pub async fn next_job(&self, task_id: i64) -> Result<Option<DispatchedJob>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/tasks/{task_id}/jobs/next")))
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Self::parse_response(response).await.map(Some)
    }

    /// Record that this worker started a job.
    pub async fn start_job(&self, job_id: i64, worker_id: &str) -> Result<JobInfo, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{job_id}/start")))
            .json(&serde_json::json!({ "worker_id": worker_id }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Upload a rendered tile.
    pub async fn complete_job(&self, job_id: i64, pixels: &[u8]) -> Result<JobInfo, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{job_id}/complete")))
            .json(&serde_json::json!({ "result_data": BASE64_STANDARD.encode(pixels) }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Unwrap the `{ "data": T }` envelope of a successful response.
    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<Envelope<T>>().await?.data)
    }
}
