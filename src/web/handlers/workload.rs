use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use crate::database::DurationKey;
use crate::web::handlers::{from_error, ok, ApiResponse};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct WorkloadQuery {
    #[serde(default)]
    pub duration_key: Option<String>,
}

pub async fn get_workload_insights(
    State(state): State<AppState>,
    Query(query): Query<WorkloadQuery>,
) -> ApiResponse {
    let duration_key = query
        .duration_key
        .as_deref()
        .and_then(DurationKey::parse)
        .unwrap_or(DurationKey::Week);

    match state.repo.get_workload_insights(duration_key) {
        Ok(insights) => ok(json!({"success": true, "data": insights})),
        Err(err) => from_error(&err),
    }
}
