pub mod devices;
pub mod monitors;
pub mod overrides;
pub mod performance;
pub mod reports;
pub mod settings;
pub mod smart;
pub mod workload;
pub mod zfs;

use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{json, Value};

use crate::error::DrivePulseError;

pub(crate) type ApiResponse = (StatusCode, Json<Value>);

pub(crate) fn ok(data: Value) -> ApiResponse {
    (StatusCode::OK, Json(data))
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    (status, Json(json!({"success": false, "error": message})))
}

/// Map an error onto the recovery policy: validation failures are the
/// caller's fault (400), anything else is a server-side failure (500) the
/// collector will retry.
pub(crate) fn from_error(err: &DrivePulseError) -> ApiResponse {
    match err {
        DrivePulseError::ValidationError(message) => {
            error_response(StatusCode::BAD_REQUEST, message)
        }
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
    }
}
