//! Job entity model (one rectangular tile of a task).

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Serialize, Serializer};
use sqlx::FromRow;
use tilefarm_core::tiling::TileRect;
use tilefarm_core::types::{DbId, Timestamp};

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
///
/// `result_data` holds raw RGBA pixels, row-major, and is present once the
/// job has been completed. It serializes as base64.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub task_id: DbId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub status_id: StatusId,
    pub assigned_worker_id: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    #[serde(serialize_with = "serialize_base64")]
    pub result_data: Option<Vec<u8>>,
}

impl Job {
    pub fn rect(&self) -> TileRect {
        TileRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}

fn serialize_base64<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match data {
        Some(bytes) => serializer.serialize_some(&BASE64_STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn job(result_data: Option<Vec<u8>>) -> Job {
        Job {
            id: 1,
            task_id: 7,
            x: 100,
            y: 200,
            width: 50,
            height: 25,
            status_id: JobStatus::Completed.id(),
            assigned_worker_id: Some("w-1".into()),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result_data,
        }
    }

    #[test]
    fn result_data_serializes_as_base64() {
        let json = serde_json::to_value(job(Some(vec![0, 1, 2, 255]))).unwrap();
        assert_eq!(json["result_data"], "AAEC/w==");
        assert_eq!(json["status_id"], 3);
    }

    #[test]
    fn missing_result_serializes_as_null() {
        let json = serde_json::to_value(job(None)).unwrap();
        assert!(json["result_data"].is_null());
    }

    #[test]
    fn rect_mirrors_columns() {
        assert_eq!(
            job(None).rect(),
            TileRect { x: 100, y: 200, width: 50, height: 25 }
        );
    }
}
