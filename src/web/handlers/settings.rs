use axum::extract::State;
use axum::response::Json;
use log::error;
use serde_json::json;

use crate::models::Settings;
use crate::web::handlers::{from_error, ok, ApiResponse};
use crate::web::AppState;

pub async fn get_settings(State(state): State<AppState>) -> ApiResponse {
    match state.repo.load_settings() {
        Ok(settings) => ok(json!({"success": true, "settings": settings})),
        Err(err) => {
            error!("Failed to load settings: {err}");
            from_error(&err)
        }
    }
}

pub async fn save_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> ApiResponse {
    match state.repo.save_settings(&settings) {
        Ok(()) => ok(json!({"success": true, "settings": settings})),
        Err(err) => {
            error!("Failed to save settings: {err}");
            from_error(&err)
        }
    }
}
