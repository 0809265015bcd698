use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::reports::ReportPeriod;
use crate::web::handlers::{error_response, from_error, ok, ApiResponse};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub period: Option<String>,
}

fn parse_period(period: Option<&str>) -> Result<ReportPeriod, ApiResponse> {
    let value = period.unwrap_or("weekly");
    ReportPeriod::parse(value).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("invalid period: {value} (must be 'daily', 'weekly', or 'monthly')"),
        )
    })
}

/// Generate a report and push it through the notifier immediately.
pub async fn send_test_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> ApiResponse {
    let period = match parse_period(request.period.as_deref()) {
        Ok(period) => period,
        Err(response) => return response,
    };

    match state.report_scheduler.send_test_report(period) {
        Ok(report) => ok(json!({"success": true, "data": report})),
        Err(err) => {
            error!("Failed to send test report: {err}");
            from_error(&err)
        }
    }
}

/// Generate a report on demand and return the data without sending it.
pub async fn generate_report(
    State(state): State<AppState>,
    Query(request): Query<ReportRequest>,
) -> ApiResponse {
    let period = match parse_period(request.period.as_deref()) {
        Ok(period) => period,
        Err(response) => return response,
    };

    match state.report_scheduler.generate_on_demand(period) {
        Ok(report) => ok(json!({"success": true, "data": report})),
        Err(err) => {
            error!("Failed to generate report: {err}");
            from_error(&err)
        }
    }
}
