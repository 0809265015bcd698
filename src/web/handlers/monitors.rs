use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::web::handlers::{from_error, ok, ApiResponse};
use crate::web::AppState;

/// Diagnostics for the missed-ping monitor: configuration, timing, and the
/// devices currently in the dedup table.
pub async fn get_missed_ping_status(State(state): State<AppState>) -> ApiResponse {
    match state.missed_ping_monitor.get_status() {
        Ok(status) => ok(json!({"success": true, "data": status})),
        Err(err) => from_error(&err),
    }
}
