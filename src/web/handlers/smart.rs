use axum::extract::{Path, State};
use axum::response::Json;
use chrono::Utc;
use log::{error, info, warn};
use serde_json::json;

use crate::collector::SmartInfo;
use crate::notify;
use crate::status::{StatusFilterAttributes, StatusThreshold};
use crate::validate;
use crate::web::handlers::{from_error, ok, ApiResponse};
use crate::web::AppState;

/// The SMART ingest path: validate the identifier, refresh device metadata,
/// evaluate the payload against metadata and merged overrides (with delta
/// suppression), persist the measurement and temperature, write the device
/// status through, and finally run the notification gate.
pub async fn upload_device_metrics(
    State(state): State<AppState>,
    Path(wwn): Path<String>,
    Json(payload): Json<SmartInfo>,
) -> ApiResponse {
    if let Err(err) = validate::validate_wwn(&wwn) {
        warn!("Invalid WWN format: {wwn}");
        return from_error(&err);
    }

    let mut updated_device = match state.repo.update_device(&wwn, &payload) {
        Ok(device) => device,
        Err(err) => {
            error!("An error occurred while updating device data from collector metrics: {err}");
            return from_error(&err);
        }
    };

    let smart = match state.repo.save_smart_attributes(&wwn, &payload) {
        Ok(smart) => smart,
        Err(err) => {
            error!("An error occurred while saving collector metrics: {err}");
            return from_error(&err);
        }
    };

    if let Err(err) = state
        .repo
        .update_device_has_forced_failure(&wwn, smart.has_forced_failure)
    {
        warn!("Failed to update has_forced_failure for device {wwn}: {err}");
    }

    if !smart.status.is_passed() {
        // a failure was detected; write the device status through
        updated_device = match state.repo.update_device_status(&wwn, smart.status) {
            Ok(device) => device,
            Err(err) => {
                error!("An error occurred while updating device status: {err}");
                return from_error(&err);
            }
        };
    } else if !updated_device.device_status.is_passed() {
        // all attributes pass again; clear the stored failure state
        updated_device = match state.repo.reset_device_status(&wwn) {
            Ok(device) => device,
            Err(err) => {
                error!("An error occurred while resetting device status: {err}");
                return from_error(&err);
            }
        };
        info!("Device {wwn} status reset to passed - all SMART attributes now within thresholds");
    }

    if let Err(err) = state.repo.save_smart_temperature(&wwn, &smart) {
        error!("An error occurred while saving temperature data: {err}");
        return from_error(&err);
    }

    let settings = match state.repo.load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            error!("An error occurred while loading settings: {err}");
            return from_error(&err);
        }
    };

    let repo = &state.repo;
    if notify::should_notify(
        &updated_device,
        &smart,
        StatusThreshold::from_setting(settings.metrics.status_threshold),
        StatusFilterAttributes::from_setting(settings.metrics.status_filter_attributes),
        settings.metrics.repeat_notifications,
        || repo.get_previous_smart_submission(&wwn),
    ) {
        let payload = notify::new_device_failure_payload(&updated_device, false, Utc::now());
        if let Err(err) =
            state
                .notifier
                .send(&payload.subject, &payload.message, payload.html.as_deref())
        {
            // notification failures never fail the ingest
            warn!("Failed to send notification for device {wwn}: {err}");
        }
    }

    ok(json!({"success": true}))
}
