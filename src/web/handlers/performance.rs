use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::Utc;
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::database::DurationKey;
use crate::measurements::Performance;
use crate::validate;
use crate::web::handlers::{from_error, ok, ApiResponse};
use crate::web::AppState;

/// Persist a block-device benchmark result from the performance collector.
pub async fn upload_device_performance(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Json(mut payload): Json<Performance>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }

    payload.device_wwn = wwn.clone();
    if payload.date.timestamp() == 0 {
        payload.date = Utc::now();
    }
    if payload.profile.is_empty() {
        payload.profile = "quick".to_string();
    }

    if let Err(err) = state.repo.save_performance_results(&payload) {
        error!("An error occurred while saving performance results: {err}");
        return from_error(&err);
    }

    ok(json!({"success": true}))
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    #[serde(default)]
    pub duration_key: Option<String>,
}

pub async fn get_device_performance(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Query(query): Query<PerformanceQuery>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        return from_error(&err);
    }

    let duration_key = query
        .duration_key
        .as_deref()
        .and_then(DurationKey::parse)
        .unwrap_or(DurationKey::Forever);

    let history = match state.repo.get_performance_history(&wwn, duration_key) {
        Ok(history) => history,
        Err(err) => return from_error(&err),
    };
    let baseline = state.repo.get_performance_baseline(&wwn, 5).ok().flatten();

    ok(json!({
        "success": true,
        "data": {
            "history": history,
            "baseline": baseline,
        }
    }))
}
