use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use log::{info, warn};
use serde_json::json;

use crate::models::AttributeOverrideRow;
use crate::overrides;
use crate::web::handlers::{error_response, from_error, ok, ApiResponse};
use crate::web::AppState;

/// List the active overrides: immutable config-file entries plus the
/// UI-managed database rows.
pub async fn list_overrides(State(state): State<AppState>) -> ApiResponse {
    let config_entries = overrides::parse_config(&state.config);
    match state.repo.get_attribute_overrides() {
        Ok(db_rows) => ok(json!({
            "success": true,
            "data": {
                "config": config_entries,
                "database": db_rows,
            }
        })),
        Err(err) => from_error(&err),
    }
}

/// Create or update an override, then re-evaluate the stored status of every
/// device it can affect.
pub async fn save_override(
    State(state): State<AppState>,
    Json(mut row): Json<AttributeOverrideRow>,
) -> ApiResponse {
    if row.source == "config" {
        return error_response(
            StatusCode::BAD_REQUEST,
            "config-file overrides are immutable; edit the config file instead",
        );
    }

    if let Err(err) = state.repo.save_attribute_override(&mut row) {
        return from_error(&err);
    }
    info!(
        "Saved attribute override {} ({} {} wwn={:?})",
        row.id, row.protocol, row.attribute_id, row.wwn
    );

    recalculate_affected(&state, &row);

    ok(json!({"success": true, "data": row}))
}

/// Delete an override and re-evaluate the devices it used to affect.
pub async fn delete_override(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResponse {
    let row = match state.repo.get_attribute_override_by_id(id) {
        Ok(Some(row)) => row,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "override not found"),
        Err(err) => return from_error(&err),
    };

    if row.source == "config" {
        return error_response(
            StatusCode::BAD_REQUEST,
            "config-file overrides are immutable; edit the config file instead",
        );
    }

    if let Err(err) = state.repo.delete_attribute_override(id) {
        return from_error(&err);
    }
    info!("Deleted attribute override {id}");

    recalculate_affected(&state, &row);

    ok(json!({"success": true}))
}

fn recalculate_affected(state: &AppState, row: &AttributeOverrideRow) {
    let wwns = match state.repo.affected_device_wwns(row) {
        Ok(wwns) => wwns,
        Err(err) => {
            warn!("Could not enumerate devices affected by override change: {err}");
            return;
        }
    };
    for wwn in wwns {
        if let Err(err) = state.repo.recalculate_device_status_from_history(&wwn) {
            warn!("Failed to recalculate status for device {wwn}: {err}");
        }
    }
}
