//! Request handlers.
//!
//! Task and job handlers delegate to the engine services on [`AppState`];
//! tile handlers drive the in-process lease coordinator and snapshot table.
//! Errors map to HTTP responses via [`AppError`].
//!
//! [`AppState`]: crate::state::AppState
//! [`AppError`]: crate::error::AppError

pub mod jobs;
pub mod mosaic;
pub mod tasks;
pub mod tiles;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;

/// `200 { "data": T }` when something was found, `204` otherwise.
pub(crate) fn data_or_no_content<T: Serialize>(value: Option<T>) -> Response {
    match value {
        Some(data) => Json(DataResponse { data }).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
