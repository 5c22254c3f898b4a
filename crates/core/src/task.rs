//! Render task parameters: request DTO, defaults, and validation.
//!
//! A task is immutable once created, so everything is resolved here
//! before the task row and its job set are written.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

/// Vertical field of view used when the request omits `fov`.
pub const DEFAULT_FOV_DEGREES: f64 = 45.0;

/// Path-tracing bounce limit used when the request omits `max_bounces`.
pub const DEFAULT_MAX_BOUNCES: i32 = 3;

/// Samples per pixel used when the request omits `samples_per_pixel`.
pub const DEFAULT_SAMPLES_PER_PIXEL: i32 = 1;

/// Largest accepted output width or height in pixels.
pub const MAX_IMAGE_DIMENSION: i64 = 65_536;

/// Maximum length of a scene resource locator.
const MAX_LOCATOR_LEN: usize = 4096;

// ---------------------------------------------------------------------------
// Request DTO
// ---------------------------------------------------------------------------

/// Body of a create-task request.
///
/// Every field is optional at the wire level so that missing required
/// values surface as a `Validation` error instead of a deserializer
/// rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskRequest {
    pub scene_mesh_url: Option<String>,
    pub scene_bvh_url: Option<String>,
    pub scene_textures_url: Option<String>,
    pub cam_position_x: Option<f64>,
    pub cam_position_y: Option<f64>,
    pub cam_position_z: Option<f64>,
    pub cam_target_x: Option<f64>,
    pub cam_target_y: Option<f64>,
    pub cam_target_z: Option<f64>,
    pub fov: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub max_bounces: Option<i32>,
    pub samples_per_pixel: Option<i32>,
}

/// Fully resolved, validated task parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
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

impl CreateTaskRequest {
    /// Validate the request and apply defaults for optional parameters.
    ///
    /// Rules:
    /// - `scene_mesh_url` is required and must not be blank.
    /// - Camera position and target components are required.
    /// - `width` and `height` are required, positive, and at most
    ///   [`MAX_IMAGE_DIMENSION`].
    /// - `fov` must lie strictly between 0 and 180 degrees.
    /// - `max_bounces` must not be negative; `samples_per_pixel` must be >= 1.
    pub fn resolve(self) -> Result<TaskParams, CoreError> {
        let scene_mesh_url = match self.scene_mesh_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => {
                return Err(CoreError::Validation(
                    "scene_mesh_url is required".to_string(),
                ))
            }
        };
        let scene_bvh_url = self.scene_bvh_url.unwrap_or_default();
        let scene_textures_url = self.scene_textures_url.unwrap_or_default();
        for (name, value) in [
            ("scene_mesh_url", &scene_mesh_url),
            ("scene_bvh_url", &scene_bvh_url),
            ("scene_textures_url", &scene_textures_url),
        ] {
            if value.len() > MAX_LOCATOR_LEN {
                return Err(CoreError::Validation(format!(
                    "{name} must not exceed {MAX_LOCATOR_LEN} characters"
                )));
            }
        }

        let width = validate_dimension("width", self.width)?;
        let height = validate_dimension("height", self.height)?;

        let fov = self.fov.unwrap_or(DEFAULT_FOV_DEGREES);
        if !(fov > 0.0 && fov < 180.0) {
            return Err(CoreError::Validation(format!(
                "fov must be between 0 and 180 degrees, got {fov}"
            )));
        }

        let max_bounces = self.max_bounces.unwrap_or(DEFAULT_MAX_BOUNCES);
        if max_bounces < 0 {
            return Err(CoreError::Validation(
                "max_bounces must not be negative".to_string(),
            ));
        }

        let samples_per_pixel = self.samples_per_pixel.unwrap_or(DEFAULT_SAMPLES_PER_PIXEL);
        if samples_per_pixel < 1 {
            return Err(CoreError::Validation(
                "samples_per_pixel must be at least 1".to_string(),
            ));
        }

        Ok(TaskParams {
            scene_mesh_url,
            scene_bvh_url,
            scene_textures_url,
            cam_position_x: require("cam_position_x", self.cam_position_x)?,
            cam_position_y: require("cam_position_y", self.cam_position_y)?,
            cam_position_z: require("cam_position_z", self.cam_position_z)?,
            cam_target_x: require("cam_target_x", self.cam_target_x)?,
            cam_target_y: require("cam_target_y", self.cam_target_y)?,
            cam_target_z: require("cam_target_z", self.cam_target_z)?,
            fov,
            width,
            height,
            max_bounces,
            samples_per_pixel,
        })
    }
}

fn require(field: &str, value: Option<f64>) -> Result<f64, CoreError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(_) => Err(CoreError::Validation(format!("{field} must be finite"))),
        None => Err(CoreError::Validation(format!("{field} is required"))),
    }
}

fn validate_dimension(field: &'static str, value: Option<i64>) -> Result<i32, CoreError> {
    let value = value.ok_or_else(|| CoreError::Validation(format!("{field} is required")))?;
    if value <= 0 {
        return Err(CoreError::InvalidDimension { field, value });
    }
    if value > MAX_IMAGE_DIMENSION {
        return Err(CoreError::Validation(format!(
            "{field} must not exceed {MAX_IMAGE_DIMENSION} pixels"
        )));
    }
    Ok(value as i32)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn valid_request() -> CreateTaskRequest {
        CreateTaskRequest {
            scene_mesh_url: Some("https://bucket.example/mesh.obj".into()),
            cam_position_x: Some(0.0),
            cam_position_y: Some(5.0),
            cam_position_z: Some(10.0),
            cam_target_x: Some(0.0),
            cam_target_y: Some(0.0),
            cam_target_z: Some(0.0),
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_applied_for_optional_fields() {
        let params = valid_request().resolve().unwrap();
        assert_eq!(params.fov, DEFAULT_FOV_DEGREES);
        assert_eq!(params.max_bounces, DEFAULT_MAX_BOUNCES);
        assert_eq!(params.samples_per_pixel, DEFAULT_SAMPLES_PER_PIXEL);
        assert_eq!(params.scene_bvh_url, "");
        assert_eq!(params.scene_textures_url, "");
    }

    #[test]
    fn explicit_values_kept() {
        let params = CreateTaskRequest {
            fov: Some(60.0),
            max_bounces: Some(0),
            samples_per_pixel: Some(16),
            scene_bvh_url: Some("s3://b/bvh.bin".into()),
            ..valid_request()
        }
        .resolve()
        .unwrap();
        assert_eq!(params.fov, 60.0);
        assert_eq!(params.max_bounces, 0);
        assert_eq!(params.samples_per_pixel, 16);
        assert_eq!(params.scene_bvh_url, "s3://b/bvh.bin");
    }

    #[test]
    fn missing_mesh_rejected() {
        let req = CreateTaskRequest {
            scene_mesh_url: None,
            ..valid_request()
        };
        assert_matches!(req.resolve(), Err(CoreError::Validation(_)));

        let blank = CreateTaskRequest {
            scene_mesh_url: Some("   ".into()),
            ..valid_request()
        };
        assert_matches!(blank.resolve(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn non_positive_dimensions_rejected() {
        let req = CreateTaskRequest {
            width: Some(0),
            ..valid_request()
        };
        assert_matches!(
            req.resolve(),
            Err(CoreError::InvalidDimension { field: "width", value: 0 })
        );

        let req = CreateTaskRequest {
            height: Some(-10),
            ..valid_request()
        };
        assert_matches!(
            req.resolve(),
            Err(CoreError::InvalidDimension { field: "height", .. })
        );
    }

    #[test]
    fn oversized_dimension_rejected() {
        let req = CreateTaskRequest {
            width: Some(MAX_IMAGE_DIMENSION + 1),
            ..valid_request()
        };
        assert_matches!(req.resolve(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn missing_camera_component_rejected() {
        let req = CreateTaskRequest {
            cam_target_z: None,
            ..valid_request()
        };
        assert_matches!(req.resolve(), Err(CoreError::Validation(msg)) if msg.contains("cam_target_z"));
    }

    #[test]
    fn out_of_range_quality_rejected() {
        for req in [
            CreateTaskRequest { fov: Some(0.0), ..valid_request() },
            CreateTaskRequest { fov: Some(180.0), ..valid_request() },
            CreateTaskRequest { max_bounces: Some(-1), ..valid_request() },
            CreateTaskRequest { samples_per_pixel: Some(0), ..valid_request() },
        ] {
            assert_matches!(req.resolve(), Err(CoreError::Validation(_)));
        }
    }
}
