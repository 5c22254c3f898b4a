use std::time::Duration;

/// Default delay between polls when no job is available.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the API server, without the `/api/v1` suffix.
    pub api_url: String,
    /// Task whose jobs this worker renders.
    pub task_id: i64,
    /// Identity recorded on started jobs.
    pub worker_id: String,
    /// Sleep between polls when nothing is claimable.
    pub poll_interval: Duration,
    /// Stop after this many submitted renders.
    pub max_jobs: Option<usize>,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var            | Default                 |
    /// |--------------------|-------------------------|
    /// | `API_URL`          | `http://localhost:3000` |
    /// | `TASK_ID`          | required                |
    /// | `WORKER_ID`        | random UUID v4          |
    /// | `POLL_INTERVAL_MS` | `1000`                  |
    /// | `MAX_JOBS`         | unlimited               |
    pub fn from_env() -> Self {
        let api_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        let task_id: i64 = std::env::var("TASK_ID")
            .expect("TASK_ID must be set")
            .trim()
            .parse()
            .expect("TASK_ID must be a valid i64");

        let worker_id = std::env::var("WORKER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_MS.to_string())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let max_jobs = std::env::var("MAX_JOBS").ok().map(|raw| {
            raw.trim()
                .parse::<usize>()
                .expect("MAX_JOBS must be a valid usize")
        });

        Self {
            api_url: normalize_base_url(&api_url),
            task_id,
            worker_id,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_jobs,
        }
    }
}

/// Strip trailing slashes so paths can be appended with `format!`.
fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
