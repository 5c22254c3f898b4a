use std::str::FromStr;
use std::time::Duration;

use tilefarm_core::aggregation::{CHANNELS, DEFAULT_PREVIEW_MAX_PIXELS};
use tilefarm_core::lease::{DEFAULT_LEASE_TIMEOUT_SECS, DEFAULT_TILES_X, DEFAULT_TILES_Y};
use tilefarm_core::mosaic::MAX_SNAPSHOT_PAYLOAD_LEN;
use tilefarm_core::tiling::DEFAULT_TILE_SIZE;

/// Default number of jobs written per bulk INSERT during task creation.
pub const DEFAULT_JOB_INSERT_BATCH_SIZE: usize = 1000;

/// Room for JSON keys and other fields around the largest payload.
const BODY_ENVELOPE_SLACK: usize = 64 * 1024;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Budget for draining in-flight requests on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Tile edge in pixels used when decomposing tasks (default: `100`).
    pub tile_size: i32,
    /// Jobs per bulk INSERT (default: `1000`).
    pub job_insert_batch_size: usize,
    /// Make start-job a conditional `created -> started` transition.
    pub strict_claim: bool,
    /// Offer `started` jobs again once they are older than this.
    pub stale_job_timeout_secs: Option<u64>,
    /// Lease heartbeat timeout in seconds (default: `20`).
    pub lease_timeout_secs: u64,
    /// Initial mosaic grid width (default: `4`).
    pub grid_tiles_x: u32,
    /// Initial mosaic grid height (default: `4`).
    pub grid_tiles_y: u32,
    /// Largest task preview, in pixels, the image endpoint will assemble.
    pub preview_max_pixels: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                       |
    /// | `TILE_SIZE`              | `100`                      |
    /// | `JOB_INSERT_BATCH_SIZE`  | `1000`                     |
    /// | `STRICT_CLAIM`           | `false`                    |
    /// | `STALE_JOB_TIMEOUT_SECS` | unset                      |
    /// | `LEASE_TIMEOUT_SECS`     | `20`                       |
    /// | `GRID_TILES_X`           | `4`                        |
    /// | `GRID_TILES_Y`           | `4`                        |
    /// | `PREVIEW_MAX_PIXELS`     | `16777216`                 |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let tile_size: i32 = env_or("TILE_SIZE", DEFAULT_TILE_SIZE);
        assert!(tile_size > 0, "TILE_SIZE must be positive");

        let job_insert_batch_size: usize =
            env_or("JOB_INSERT_BATCH_SIZE", DEFAULT_JOB_INSERT_BATCH_SIZE);
        assert!(job_insert_batch_size > 0, "JOB_INSERT_BATCH_SIZE must be positive");

        let stale_job_timeout_secs = std::env::var("STALE_JOB_TIMEOUT_SECS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse::<u64>()
                    .expect("STALE_JOB_TIMEOUT_SECS must be a valid u64")
            });

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            tile_size,
            job_insert_batch_size,
            strict_claim: env_or("STRICT_CLAIM", false),
            stale_job_timeout_secs,
            lease_timeout_secs: env_or("LEASE_TIMEOUT_SECS", DEFAULT_LEASE_TIMEOUT_SECS),
            grid_tiles_x: env_or("GRID_TILES_X", DEFAULT_TILES_X),
            grid_tiles_y: env_or("GRID_TILES_Y", DEFAULT_TILES_Y),
            preview_max_pixels: env_or("PREVIEW_MAX_PIXELS", DEFAULT_PREVIEW_MAX_PIXELS),
        }
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn stale_job_timeout(&self) -> Option<Duration> {
        self.stale_job_timeout_secs.map(Duration::from_secs)
    }

    /// Request body limit: fits a full snapshot or a base64 encoded
    /// full-size tile, whichever is larger.
    pub fn body_limit(&self) -> usize {
        let edge = self.tile_size.max(1) as usize;
        let tile_bytes = edge.saturating_mul(edge).saturating_mul(CHANNELS);
        let tile_base64 = tile_bytes.div_ceil(3).saturating_mul(4);
        tile_base64
            .max(MAX_SNAPSHOT_PAYLOAD_LEN)
            .saturating_add(BODY_ENVELOPE_SLACK)
    }
}

/// Parse an env var, falling back to `default` when unset.
///
/// Panics on a value that does not parse; misconfiguration fails at startup.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tile_size: i32) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            tile_size,
            job_insert_batch_size: DEFAULT_JOB_INSERT_BATCH_SIZE,
            strict_claim: false,
            stale_job_timeout_secs: None,
            lease_timeout_secs: DEFAULT_LEASE_TIMEOUT_SECS,
            grid_tiles_x: DEFAULT_TILES_X,
            grid_tiles_y: DEFAULT_TILES_Y,
            preview_max_pixels: DEFAULT_PREVIEW_MAX_PIXELS,
        }
    }

    #[test]
    fn body_limit_covers_largest_snapshot() {
        assert_eq!(
            config(100).body_limit(),
            MAX_SNAPSHOT_PAYLOAD_LEN + BODY_ENVELOPE_SLACK
        );
    }

    #[test]
    fn body_limit_grows_with_tile_size() {
        // 2048px RGBA tile: 16 MiB raw, about 21.3 MiB as base64.
        let limit = config(2048).body_limit();
        assert!(limit > (2048 * 2048 * CHANNELS) / 3 * 4);
        assert!(limit > MAX_SNAPSHOT_PAYLOAD_LEN + BODY_ENVELOPE_SLACK);
    }
}
