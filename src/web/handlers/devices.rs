use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::models::Device;
use crate::validate;
use crate::web::handlers::{error_response, from_error, ok, ApiResponse};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterDevicesRequest {
    #[serde(default)]
    pub data: Vec<Device>,
}

/// Collector start-up: upsert every attached device by WWN.
pub async fn register_devices(
    State(state): State<AppState>,
    Json(request): Json<RegisterDevicesRequest>,
) -> ApiResponse {
    for device in &request.data {
        if let Err(err) = validate::validate_wwn(&device.wwn) {
            return from_error(&err);
        }
    }

    for device in &request.data {
        if let Err(err) = state.repo.register_device(device) {
            error!("Failed to register device {}: {err}", device.wwn);
            return from_error(&err);
        }
        info!("Registered device {} ({})", device.wwn, device.device_name);
    }

    ok(json!({"success": true, "data": request.data}))
}

pub async fn get_summary(State(state): State<AppState>) -> ApiResponse {
    match state.repo.get_summary() {
        Ok(summary) => ok(json!({"success": true, "data": {"summary": summary}})),
        Err(err) => from_error(&err),
    }
}

pub async fn get_device_details(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }
    match state.repo.get_device_details(&wwn) {
        Ok(device) => {
            let smart = state.repo.get_latest_smart_submission(&wwn).ok().flatten();
            ok(json!({"success": true, "data": {"device": device, "smart": smart}}))
        }
        Err(err) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
    }
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }
    match state.repo.delete_device(&wwn) {
        Ok(()) => {
            info!("Deleted device {wwn} and its measurement history");
            ok(json!({"success": true}))
        }
        Err(err) => from_error(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchivedRequest {
    pub archived: bool,
}

pub async fn update_device_archived(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Json(request): Json<ArchivedRequest>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }
    match state.repo.update_device_archived(&wwn, request.archived) {
        Ok(()) => ok(json!({"success": true})),
        Err(err) => from_error(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct MutedRequest {
    pub muted: bool,
}

pub async fn update_device_muted(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Json(request): Json<MutedRequest>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }
    match state.repo.update_device_muted(&wwn, request.muted) {
        Ok(()) => ok(json!({"success": true})),
        Err(err) => from_error(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    #[serde(default)]
    pub label: String,
}

pub async fn update_device_label(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Json(request): Json<LabelRequest>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }
    match state.repo.update_device_label(&wwn, &request.label) {
        Ok(()) => ok(json!({"success": true})),
        Err(err) => from_error(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct SmartDisplayModeRequest {
    pub smart_display_mode: String,
}

pub async fn update_device_smart_display_mode(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Json(request): Json<SmartDisplayModeRequest>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }
    match state
        .repo
        .update_device_smart_display_mode(&wwn, &request.smart_display_mode)
    {
        Ok(()) => ok(json!({"success": true})),
        Err(err) => from_error(&err),
    }
}
