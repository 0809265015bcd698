use axum::extract::{Path, State};
use axum::response::Json;
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use crate::measurements::ZfsPoolMetrics;
use crate::validate;
use crate::web::handlers::{from_error, ok, ApiResponse};
use crate::web::AppState;
use crate::zfs::ZfsPool;

#[derive(Debug, Deserialize)]
pub struct RegisterPoolsRequest {
    #[serde(default)]
    pub data: Vec<PoolRegistration>,
}

/// One pool as reported by the collector: parsed summary fields plus the
/// raw `zpool status` output, which drives the scrub state machine
/// server-side.
#[derive(Debug, Deserialize)]
pub struct PoolRegistration {
    #[serde(flatten)]
    pub pool: ZfsPool,
    #[serde(default)]
    pub status_output: String,
}

pub async fn register_pools(
    State(state): State<AppState>,
    Json(request): Json<RegisterPoolsRequest>,
) -> ApiResponse {
    for registration in &request.data {
        if let Err(err) = validate::validate_guid(&registration.pool.guid) {
            return from_error(&err);
        }
    }

    for registration in &request.data {
        let mut pool = registration.pool.clone();
        if !registration.status_output.is_empty() {
            pool.parse_scrub_status(&registration.status_output);
        }
        if let Err(err) = state.repo.register_zfs_pool(&pool) {
            error!("Failed to register zfs pool {}: {err}", pool.guid);
            return from_error(&err);
        }
        info!("Registered zfs pool {} ({})", pool.guid, pool.name);
    }

    ok(json!({"success": true, "data": request.data.len()}))
}

pub async fn get_pools_summary(State(state): State<AppState>) -> ApiResponse {
    match state.repo.get_zfs_pools_summary() {
        Ok(summary) => ok(json!({"success": true, "data": {"pools": summary}})),
        Err(err) => from_error(&err),
    }
}

pub async fn upload_pool_metrics(
    State(state): State<AppState>,
    Path(guid): Path<String>,
    Json(mut metrics): Json<ZfsPoolMetrics>,
) -> ApiResponse {
    if let Err(err) = validate::validate_guid(&guid) {
        return from_error(&err);
    }

    metrics.pool_guid = guid;
    if metrics.date.timestamp() == 0 {
        metrics.date = Utc::now();
    }

    match state.repo.save_zfs_pool_metrics(&metrics) {
        Ok(()) => ok(json!({"success": true})),
        Err(err) => from_error(&err),
    }
}

pub async fn delete_pool(State(state): State<AppState>, Path(guid): Path<String>) -> ApiResponse {
    if let Err(err) = validate::validate_guid(&guid) {
        return from_error(&err);
    }
    match state.repo.delete_zfs_pool(&guid) {
        Ok(()) => {
            info!("Deleted zfs pool {guid} and its metrics history");
            ok(json!({"success": true}))
        }
        Err(err) => from_error(&err),
    }
}
